use chrono::{Local, NaiveDateTime};

/// Time source for scheduling runs.
///
/// Every horizon/urgency computation is a pure function of the time this
/// clock reports; nothing in the pipeline reads the wall clock directly.
/// A simulated time can be pinned for deterministic runs and cleared to
/// return to the system clock.
#[derive(Debug, Clone, Default)]
pub struct Clock {
    simulated: Option<NaiveDateTime>,
}

impl Clock {
    pub fn new() -> Self {
        Self { simulated: None }
    }

    pub fn fixed(now: NaiveDateTime) -> Self {
        Self {
            simulated: Some(now),
        }
    }

    pub fn now(&self) -> NaiveDateTime {
        match self.simulated {
            Some(now) => now,
            None => Local::now().naive_local(),
        }
    }

    pub fn set_simulated(&mut self, now: NaiveDateTime) {
        self.simulated = Some(now);
    }

    pub fn clear_simulated(&mut self) {
        self.simulated = None;
    }

    pub fn is_simulated(&self) -> bool {
        self.simulated.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn simulated_time_overrides_and_clears() {
        let pinned = NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let mut clock = Clock::fixed(pinned);
        assert_eq!(clock.now(), pinned);
        assert!(clock.is_simulated());

        clock.clear_simulated();
        assert!(!clock.is_simulated());
    }
}
