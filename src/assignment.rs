//! Round-robin rider selection.

use crate::models::Rider;

/// Session-scoped round-robin cursor.
///
/// Inactive riders are not skipped; the cursor walks the list exactly as
/// loaded.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume a cursor saved earlier in the same session.
    pub fn starting_at(counter: usize) -> Self {
        Self { counter }
    }

    /// Pick the rider for the next assignment. `None` when there are no
    /// riders, in which case the cursor does not move.
    pub fn pick<'a>(&mut self, riders: &'a [Rider]) -> Option<&'a Rider> {
        if riders.is_empty() {
            return None;
        }
        let rider = &riders[self.counter % riders.len()];
        self.counter = self.counter.wrapping_add(1);
        Some(rider)
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }

    pub fn position(&self) -> usize {
        self.counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rider(id: &str, active: bool) -> Rider {
        Rider {
            id: id.to_string(),
            name: format!("Rider {id}"),
            phone: "555".to_string(),
            zone: None,
            is_active: Some(active),
            created_at: None,
        }
    }

    #[test]
    fn ith_call_picks_index_i_mod_n() {
        let riders = vec![rider("a", true), rider("b", true), rider("c", true)];
        let mut rr = RoundRobin::new();
        let picked: Vec<_> = (0..7)
            .map(|_| rr.pick(&riders).unwrap().id.clone())
            .collect();
        assert_eq!(picked, vec!["a", "b", "c", "a", "b", "c", "a"]);
    }

    #[test]
    fn inactive_riders_are_not_skipped() {
        let riders = vec![rider("a", true), rider("b", false)];
        let mut rr = RoundRobin::new();
        rr.pick(&riders);
        assert_eq!(rr.pick(&riders).unwrap().id, "b");
    }

    #[test]
    fn empty_list_leaves_cursor_untouched() {
        let mut rr = RoundRobin::new();
        assert!(rr.pick(&[]).is_none());
        assert_eq!(rr.position(), 0);
    }

    #[test]
    fn resumed_cursor_continues_the_rotation() {
        let riders = vec![rider("a", true), rider("b", true), rider("c", true)];
        let mut rr = RoundRobin::starting_at(4);
        assert_eq!(rr.pick(&riders).unwrap().id, "b");
        assert_eq!(rr.position(), 5);
    }

    #[test]
    fn reset_starts_over_at_first_rider() {
        let riders = vec![rider("a", true), rider("b", true)];
        let mut rr = RoundRobin::new();
        rr.pick(&riders);
        rr.reset();
        assert_eq!(rr.pick(&riders).unwrap().id, "a");
    }
}
