use sluice_base::{config_error, Result};

/// The operator's capability table: the handful of functions it needs to turn
/// raw events into sessions. Modelled as function-typed fields rather than a
/// trait hierarchy, since the operator only ever calls these six operations.
pub struct SessionWindowConfig<E, K, A, R> {
    pub(crate) session_timeout: i64,
    pub(crate) timestamp_fn: Box<dyn Fn(&E) -> i64>,
    pub(crate) key_fn: Box<dyn Fn(&E) -> K>,
    pub(crate) new_acc: Box<dyn Fn() -> A>,
    pub(crate) accumulate: Box<dyn Fn(&mut A, &E)>,
    pub(crate) combine: Box<dyn Fn(&mut A, A)>,
    pub(crate) finish: Box<dyn Fn(A) -> R>,
}

impl<E, K, A, R> SessionWindowConfig<E, K, A, R> {
    pub fn builder() -> SessionWindowConfigBuilder<E, K, A, R> {
        SessionWindowConfigBuilder::default()
    }

    pub fn session_timeout(&self) -> i64 {
        self.session_timeout
    }
}

pub struct SessionWindowConfigBuilder<E, K, A, R> {
    session_timeout: Option<i64>,
    timestamp_fn: Option<Box<dyn Fn(&E) -> i64>>,
    key_fn: Option<Box<dyn Fn(&E) -> K>>,
    new_acc: Option<Box<dyn Fn() -> A>>,
    accumulate: Option<Box<dyn Fn(&mut A, &E)>>,
    combine: Option<Box<dyn Fn(&mut A, A)>>,
    finish: Option<Box<dyn Fn(A) -> R>>,
}

impl<E, K, A, R> Default for SessionWindowConfigBuilder<E, K, A, R> {
    fn default() -> Self {
        SessionWindowConfigBuilder {
            session_timeout: None,
            timestamp_fn: None,
            key_fn: None,
            new_acc: None,
            accumulate: None,
            combine: None,
            finish: None,
        }
    }
}

impl<E, K, A, R> SessionWindowConfigBuilder<E, K, A, R> {
    pub fn session_timeout(mut self, timeout: i64) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    pub fn timestamp_fn(mut self, f: impl Fn(&E) -> i64 + 'static) -> Self {
        self.timestamp_fn = Some(Box::new(f));
        self
    }

    pub fn key_fn(mut self, f: impl Fn(&E) -> K + 'static) -> Self {
        self.key_fn = Some(Box::new(f));
        self
    }

    pub fn new_acc(mut self, f: impl Fn() -> A + 'static) -> Self {
        self.new_acc = Some(Box::new(f));
        self
    }

    pub fn accumulate(mut self, f: impl Fn(&mut A, &E) + 'static) -> Self {
        self.accumulate = Some(Box::new(f));
        self
    }

    pub fn combine(mut self, f: impl Fn(&mut A, A) + 'static) -> Self {
        self.combine = Some(Box::new(f));
        self
    }

    pub fn finish(mut self, f: impl Fn(A) -> R + 'static) -> Self {
        self.finish = Some(Box::new(f));
        self
    }

    pub fn build(self) -> Result<SessionWindowConfig<E, K, A, R>> {
        let session_timeout = self
            .session_timeout
            .ok_or_else(|| config_error("sessionTimeout is required"))?;
        if session_timeout <= 0 {
            return Err(config_error("sessionTimeout must be positive"));
        }
        Ok(SessionWindowConfig {
            session_timeout,
            timestamp_fn: self
                .timestamp_fn
                .ok_or_else(|| config_error("timestampFn is required"))?,
            key_fn: self.key_fn.ok_or_else(|| config_error("keyFn is required"))?,
            new_acc: self.new_acc.ok_or_else(|| config_error("newAcc is required"))?,
            accumulate: self
                .accumulate
                .ok_or_else(|| config_error("accumulate is required"))?,
            combine: self.combine.ok_or_else(|| config_error("combine is required"))?,
            finish: self.finish.ok_or_else(|| config_error("finish is required"))?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn rejects_non_positive_timeout() {
        let result: Result<SessionWindowConfig<i64, i64, i64, i64>> = SessionWindowConfig::builder()
            .session_timeout(0)
            .timestamp_fn(|e| *e)
            .key_fn(|_| 0)
            .new_acc(|| 0)
            .accumulate(|a, e| *a += e)
            .combine(|a, b| *a += b)
            .finish(|a| a)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn rejects_missing_fields() {
        let result: Result<SessionWindowConfig<i64, i64, i64, i64>> =
            SessionWindowConfig::builder().session_timeout(10).build();
        assert!(result.is_err());
    }
}
