use std::time::{Duration, Instant};

/// Coalesces rapid query edits. The host polls it from its event loop.
#[derive(Debug, Clone)]
pub struct QueryDebounce {
    delay: Duration,
    pending: Option<(String, Instant)>,
}

impl QueryDebounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn push(&mut self, query: String, now: Instant) {
        self.pending = Some((query, now + self.delay));
    }

    pub fn poll(&mut self, now: Instant) -> Option<String> {
        match &self.pending {
            Some((_, deadline)) if *deadline <= now => self.pending.take().map(|(query, _)| query),
            _ => None,
        }
    }

    pub fn flush(&mut self) -> Option<String> {
        self.pending.take().map(|(query, _)| query)
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, deadline)| *deadline)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_last_edit_is_released_after_quiet_period() {
        let start = Instant::now();
        let mut debounce = QueryDebounce::new(Duration::from_millis(200));
        debounce.push("f".into(), start);
        debounce.push("fo".into(), start + Duration::from_millis(100));
        debounce.push("foo".into(), start + Duration::from_millis(150));

        assert_eq!(debounce.poll(start + Duration::from_millis(300)), None);
        assert_eq!(
            debounce.poll(start + Duration::from_millis(350)).as_deref(),
            Some("foo")
        );
        assert!(!debounce.is_pending());
        assert_eq!(debounce.poll(start + Duration::from_secs(5)), None);
    }

    #[test]
    fn flush_bypasses_delay() {
        let now = Instant::now();
        let mut debounce = QueryDebounce::new(Duration::from_secs(10));
        debounce.push("query".into(), now);
        assert_eq!(debounce.deadline(), Some(now + Duration::from_secs(10)));
        assert_eq!(debounce.flush().as_deref(), Some("query"));
        assert_eq!(debounce.flush(), None);
    }

    #[test]
    fn zero_delay_releases_on_next_poll() {
        let now = Instant::now();
        let mut debounce = QueryDebounce::new(Duration::ZERO);
        debounce.push("x".into(), now);
        assert_eq!(debounce.poll(now).as_deref(), Some("x"));
    }
}
