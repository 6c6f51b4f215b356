//! Manual-intervention wrapper around challenge providers
//!
//! Every provider handed out by the registry is wrapped in
//! [`LoggingProvider`]. Before the backend runs, the exact TXT record is
//! logged so an operator can publish it by hand if the API call fails.

use async_trait::async_trait;
use tracing::info;

use crate::dns01::challenge_info;
use crate::traits::{ChallengeProvider, ChallengeTimeout};

/// Wraps a backend and announces each challenge record
pub struct LoggingProvider {
    inner: Box<dyn ChallengeProvider>,
}

impl LoggingProvider {
    /// Wrap a backend
    pub fn new(inner: Box<dyn ChallengeProvider>) -> Self {
        Self { inner }
    }

    /// Unwrap the backend
    pub fn into_inner(self) -> Box<dyn ChallengeProvider> {
        self.inner
    }
}

#[async_trait]
impl ChallengeProvider for LoggingProvider {
    async fn present(&self, domain: &str, token: &str, key_auth: &str) -> crate::Result<()> {
        let record = challenge_info(domain, key_auth);

        info!(
            provider = self.inner.provider_name(),
            domain = %domain,
            host = %record.fqdn,
            record_type = "TXT",
            value = %record.value,
            "Add this TXT record manually if the provider API fails: {} TXT \"{}\"",
            record.fqdn,
            record.value
        );

        self.inner.present(domain, token, key_auth).await
    }

    async fn cleanup(&self, domain: &str, token: &str, key_auth: &str) -> crate::Result<()> {
        self.inner.cleanup(domain, token, key_auth).await
    }

    fn timeout(&self) -> Option<ChallengeTimeout> {
        Some(self.inner.timeout().unwrap_or_default())
    }

    fn sequential(&self) -> bool {
        self.inner.sequential()
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}

impl std::fmt::Debug for LoggingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingProvider")
            .field("inner", &self.inner.provider_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Backend {
        fail: bool,
        timeout: Option<ChallengeTimeout>,
        sequential: bool,
        presents: Arc<AtomicUsize>,
        cleanups: Arc<AtomicUsize>,
    }

    impl Backend {
        fn new(fail: bool, timeout: Option<ChallengeTimeout>) -> Self {
            Self {
                fail,
                timeout,
                sequential: false,
                presents: Arc::new(AtomicUsize::new(0)),
                cleanups: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl ChallengeProvider for Backend {
        async fn present(&self, _: &str, _: &str, _: &str) -> crate::Result<()> {
            self.presents.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::provider("backend", "api down"));
            }
            Ok(())
        }

        async fn cleanup(&self, _: &str, _: &str, _: &str) -> crate::Result<()> {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn timeout(&self) -> Option<ChallengeTimeout> {
            self.timeout
        }

        fn sequential(&self) -> bool {
            self.sequential
        }

        fn provider_name(&self) -> &'static str {
            "backend"
        }
    }

    #[test]
    fn test_timeout_falls_back_to_default() {
        let wrapped = LoggingProvider::new(Box::new(Backend::new(false, None)));
        assert_eq!(wrapped.timeout(), Some(ChallengeTimeout::default()));
    }

    #[test]
    fn test_timeout_passes_through() {
        let custom = ChallengeTimeout::new(Duration::from_secs(600), Duration::from_secs(10));
        let wrapped = LoggingProvider::new(Box::new(Backend::new(false, Some(custom))));
        assert_eq!(wrapped.timeout(), Some(custom));
        assert_eq!(wrapped.provider_name(), "backend");
    }

    #[test]
    fn test_sequential_passes_through() {
        let wrapped = LoggingProvider::new(Box::new(Backend::new(false, None)));
        assert!(!wrapped.sequential());

        let mut backend = Backend::new(false, None);
        backend.sequential = true;
        let wrapped = LoggingProvider::new(Box::new(backend));
        assert!(wrapped.sequential());
    }

    #[tokio::test]
    async fn test_present_and_cleanup_delegate() {
        let backend = Backend::new(false, None);
        let presents = backend.presents.clone();
        let cleanups = backend.cleanups.clone();
        let wrapped = LoggingProvider::new(Box::new(backend));

        wrapped.present("example.com", "tok", "ka").await.unwrap();
        wrapped.cleanup("example.com", "tok", "ka").await.unwrap();

        assert_eq!(presents.load(Ordering::SeqCst), 1);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_present_error_returned_unchanged() {
        let wrapped = LoggingProvider::new(Box::new(Backend::new(true, None)));
        let err = wrapped.present("example.com", "tok", "ka").await.unwrap_err();
        assert!(matches!(err, Error::Provider { ref message, .. } if message == "api down"));
    }
}
