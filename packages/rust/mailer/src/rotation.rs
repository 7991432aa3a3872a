//! Round-robin sender rotation.

use leadflow_shared::{LeadflowError, Result, SenderIdentity};

/// Ordered sender identities; the n-th pick uses sender `n % len`,
/// skipping any sender retired during the run.
#[derive(Debug, Clone)]
pub struct SenderRotation {
    senders: Vec<SenderIdentity>,
    retired: Vec<bool>,
    cursor: usize,
}

impl SenderRotation {
    /// Build a rotation. An empty sender list is a configuration error.
    pub fn new(senders: Vec<SenderIdentity>) -> Result<Self> {
        if senders.is_empty() {
            return Err(LeadflowError::config("no sender accounts configured"));
        }
        Ok(Self {
            retired: vec![false; senders.len()],
            senders,
            cursor: 0,
        })
    }

    /// Next usable sender, or `None` once every sender is retired.
    pub fn next_sender(&mut self) -> Option<(usize, &SenderIdentity)> {
        let len = self.senders.len();
        for _ in 0..len {
            let idx = self.cursor % len;
            self.cursor = self.cursor.wrapping_add(1);
            if !self.retired[idx] {
                return Some((idx, &self.senders[idx]));
            }
        }
        None
    }

    /// Take a sender out of rotation for the rest of the run.
    pub fn retire(&mut self, idx: usize) {
        if let Some(flag) = self.retired.get_mut(idx) {
            *flag = true;
        }
    }

    /// Senders not yet retired.
    pub fn active_count(&self) -> usize {
        self.retired.iter().filter(|r| !**r).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn senders(n: usize) -> Vec<SenderIdentity> {
        (1..=n)
            .map(|i| SenderIdentity {
                address: format!("s{i}@leadflow.example"),
                password: "pw".into(),
                display_name: format!("Sender {i}"),
            })
            .collect()
    }

    #[test]
    fn round_robin_order() {
        let mut rotation = SenderRotation::new(senders(3)).unwrap();
        let picks: Vec<usize> = (0..7).map(|_| rotation.next_sender().unwrap().0).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn retired_senders_are_skipped() {
        let mut rotation = SenderRotation::new(senders(3)).unwrap();
        rotation.retire(1);
        let picks: Vec<usize> = (0..4).map(|_| rotation.next_sender().unwrap().0).collect();
        assert_eq!(picks, vec![0, 2, 0, 2]);
        assert_eq!(rotation.active_count(), 2);
    }

    #[test]
    fn exhausted_when_all_retired() {
        let mut rotation = SenderRotation::new(senders(2)).unwrap();
        rotation.retire(0);
        rotation.retire(1);
        assert!(rotation.next_sender().is_none());
    }

    #[test]
    fn empty_is_config_error() {
        let err = SenderRotation::new(Vec::new()).unwrap_err();
        assert!(matches!(err, LeadflowError::Config { .. }));
    }
}
