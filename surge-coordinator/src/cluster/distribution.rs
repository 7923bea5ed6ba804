//! Greedy balancing of user amounts across agents

use crate::error::ClusterError;
use std::cmp::Reverse;

#[derive(Debug, Clone, Copy)]
struct Slot {
    index: usize,
    users: usize,
}

fn slots(amounts: &[usize]) -> Result<Vec<Slot>, ClusterError> {
    if amounts.is_empty() {
        return Err(ClusterError::NoAgents);
    }
    Ok(amounts
        .iter()
        .enumerate()
        .map(|(index, &users)| Slot { index, users })
        .collect())
}

/// Split `n` new users over agents currently running `amounts` users.
///
/// Each unit goes to the agent with the fewest users at that point, the
/// earliest agent on ties. The returned vector holds the amount owed to each agent, by index.
pub fn addition_distribution(amounts: &[usize], n: usize) -> Result<Vec<usize>, ClusterError> {
    let mut slots = slots(amounts)?;
    let mut owed = vec![0; amounts.len()];

    for _ in 0..n {
        slots.sort_by_key(|slot| (slot.users, slot.index));
        slots[0].users += 1;
        owed[slots[0].index] += 1;
    }

    Ok(owed)
}

/// Split the removal of `n` users over agents currently running `amounts`
/// users.
///
/// Each unit is taken from the agent with the most users, the earliest agent
/// on ties. An agent never
/// goes below zero, so the total may be less than `n`.
pub fn deletion_distribution(amounts: &[usize], n: usize) -> Result<Vec<usize>, ClusterError> {
    let mut slots = slots(amounts)?;
    let mut owed = vec![0; amounts.len()];

    for _ in 0..n {
        slots.sort_by_key(|slot| (Reverse(slot.users), slot.index));
        if slots[0].users > 0 {
            slots[0].users -= 1;
            owed[slots[0].index] += 1;
        }
    }

    Ok(owed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addition_evens_out_idle_agents() {
        let owed = addition_distribution(&[0, 0, 0], 8).unwrap();
        assert_eq!(owed.iter().sum::<usize>(), 8);

        let max = owed.iter().max().unwrap();
        let min = owed.iter().min().unwrap();
        assert!(max - min <= 1, "unbalanced distribution {:?}", owed);
    }

    #[test]
    fn test_ties_go_to_the_earliest_agent() {
        assert_eq!(addition_distribution(&[0, 0, 0], 4).unwrap(), vec![2, 1, 1]);
        assert_eq!(addition_distribution(&[0, 0, 0], 8).unwrap(), vec![3, 3, 2]);
        assert_eq!(addition_distribution(&[2, 1, 1], 1).unwrap(), vec![0, 1, 0]);

        assert_eq!(deletion_distribution(&[2, 2, 2], 4).unwrap(), vec![2, 1, 1]);
        assert_eq!(deletion_distribution(&[4, 4, 4], 5).unwrap(), vec![2, 2, 1]);
        assert_eq!(deletion_distribution(&[1, 3, 3], 1).unwrap(), vec![0, 1, 0]);
    }

    #[test]
    fn test_addition_fills_the_lightest_agent_first() {
        assert_eq!(addition_distribution(&[1, 5], 8).unwrap(), vec![6, 2]);
        assert_eq!(addition_distribution(&[4, 0, 4], 3).unwrap(), vec![0, 3, 0]);
    }

    #[test]
    fn test_deletion_drains_the_heaviest_agent_first() {
        assert_eq!(deletion_distribution(&[3, 9, 0], 8).unwrap(), vec![1, 7, 0]);
    }

    #[test]
    fn test_deletion_never_goes_negative() {
        let owed = deletion_distribution(&[1, 2], 10).unwrap();
        assert_eq!(owed, vec![1, 2]);

        assert_eq!(deletion_distribution(&[0, 0], 4).unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_zero_amount() {
        assert_eq!(addition_distribution(&[2, 3], 0).unwrap(), vec![0, 0]);
        assert_eq!(deletion_distribution(&[2, 3], 0).unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_no_agents() {
        assert!(matches!(addition_distribution(&[], 1), Err(ClusterError::NoAgents)));
        assert!(matches!(deletion_distribution(&[], 1), Err(ClusterError::NoAgents)));
    }
}
