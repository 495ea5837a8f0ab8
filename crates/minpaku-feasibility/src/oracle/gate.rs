use super::{quota_reply, OracleError, OracleResponse, ReasoningOracle, VisionOracle};
use std::sync::Mutex;
use tracing::warn;

/// Wraps an oracle for the lifetime of one session. Once the inner oracle
/// reports a permanent failure (unavailable or quota), every later call
/// returns that same failure without reaching the provider.
#[derive(Debug)]
pub struct GatedOracle<O> {
    inner: O,
    tripped: Mutex<Option<OracleError>>,
}

impl<O> GatedOracle<O> {
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            tripped: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }

    /// The permanent failure observed so far, if any.
    pub fn tripped(&self) -> Option<OracleError> {
        self.tripped.lock().expect("oracle gate mutex poisoned").clone()
    }

    pub fn is_available(&self) -> bool {
        self.tripped().is_none()
    }

    /// Closes the gate on a permanent failure. Later trips keep the first.
    pub fn trip(&self, err: &OracleError) {
        if !err.is_permanent() {
            return;
        }
        let mut tripped = self.tripped.lock().expect("oracle gate mutex poisoned");
        if tripped.is_none() {
            warn!(error = %err, "oracle disabled for the rest of the session");
            *tripped = Some(err.clone());
        }
    }

    fn guarded(
        &self,
        call: impl FnOnce(&O) -> Result<OracleResponse, OracleError>,
    ) -> Result<OracleResponse, OracleError> {
        if let Some(err) = self.tripped() {
            return Err(err);
        }

        let result = match call(&self.inner) {
            Ok(response) if quota_reply(&response.text) => {
                Err(OracleError::QuotaExhausted(response.text.trim().to_string()))
            }
            other => other,
        };
        if let Err(err) = &result {
            self.trip(err);
        }
        result
    }
}

impl<O: ReasoningOracle> ReasoningOracle for GatedOracle<O> {
    fn generate(&self, prompt: &str) -> Result<OracleResponse, OracleError> {
        self.guarded(|inner| inner.generate(prompt))
    }

    fn generate_with_search(&self, prompt: &str) -> Result<OracleResponse, OracleError> {
        self.guarded(|inner| inner.generate_with_search(prompt))
    }

    fn disable(&self, reason: &OracleError) {
        self.trip(reason)
    }
}

impl<O: VisionOracle> VisionOracle for GatedOracle<O> {
    fn read_image(
        &self,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
    ) -> Result<OracleResponse, OracleError> {
        self.guarded(|inner| inner.read_image(prompt, image, mime_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingOracle {
        calls: AtomicUsize,
        fail_with: Option<OracleError>,
        reply: Option<&'static str>,
    }

    impl ReasoningOracle for CountingOracle {
        fn generate(&self, _prompt: &str) -> Result<OracleResponse, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.fail_with {
                Some(err) => Err(err.clone()),
                None => Ok(OracleResponse::text(self.reply.unwrap_or("ok"))),
            }
        }
    }

    #[test]
    fn quota_sentence_in_a_reply_closes_the_gate() {
        let gate = GatedOracle::new(CountingOracle {
            reply: Some("エラー: Gemini APIのクォータ制限に達しています"),
            ..CountingOracle::default()
        });

        let first = gate.generate("first").expect_err("quota text is a failure");
        assert!(first.is_quota());
        assert!(gate.generate("second").is_err());
        assert_eq!(gate.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callers_can_close_the_gate_explicitly() {
        let gate = GatedOracle::new(CountingOracle::default());
        gate.disable(&OracleError::Request("timeout".into()));
        assert!(gate.is_available(), "transient reasons are ignored");

        gate.disable(&OracleError::QuotaExhausted("429".into()));
        gate.disable(&OracleError::Unavailable("later".into()));
        assert!(gate.tripped().is_some_and(|err| err.is_quota()));
        assert!(gate.generate("after").is_err());
        assert_eq!(gate.inner().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn quota_failure_disables_later_calls() {
        let gate = GatedOracle::new(CountingOracle {
            fail_with: Some(OracleError::QuotaExhausted("429".into())),
            ..CountingOracle::default()
        });

        assert!(gate.generate("first").is_err());
        let second = gate.generate("second").expect_err("gate stays closed");
        assert!(second.is_quota());
        assert_eq!(gate.inner().calls.load(Ordering::SeqCst), 1);
        assert!(!gate.is_available());
    }

    #[test]
    fn transient_failure_keeps_gate_open() {
        let gate = GatedOracle::new(CountingOracle {
            fail_with: Some(OracleError::Request("timeout".into())),
            ..CountingOracle::default()
        });

        assert!(gate.generate("first").is_err());
        assert!(gate.generate("second").is_err());
        assert_eq!(gate.inner().calls.load(Ordering::SeqCst), 2);
        assert!(gate.is_available());
    }
}
