//! Profile descriptors and the one-shot fair-share budget allocator.

use crate::config::ProfileConfig;
use crate::error::StartupError;

/// Default spawn ratio when a profile's `rubber_params` omits one.
pub const DEFAULT_SPAWN_RATIO: f64 = 0.2;

/// Immutable after load. `max_vms` is computed once by [`BudgetAllocator`].
#[derive(Debug, Clone)]
pub struct Profile {
    id: String,
    queue_name: String,
    spawn_args: serde_json::Value,
    spawn_ratio: f64,
    max_vms: u32,
}

impl Profile {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn spawn_args(&self) -> &serde_json::Value {
        &self.spawn_args
    }

    pub fn spawn_ratio(&self) -> f64 {
        self.spawn_ratio
    }

    pub fn max_vms(&self) -> u32 {
        self.max_vms
    }
}

/// Read-only after construction. Preserves the configuration's iteration
/// order so budget allocation and per-tick evaluation are deterministic.
#[derive(Debug, Clone)]
pub struct ProfileTable {
    profiles: Vec<Profile>,
}

impl ProfileTable {
    pub fn iter(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.iter()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.id == id)
    }
}

/// Called exactly once at controller construction.
pub struct BudgetAllocator;

impl BudgetAllocator {
    /// Every profile receives `floor(max_vm_qty / n)`; the first
    /// `max_vm_qty mod n` profiles (in configuration iteration order)
    /// each receive one extra slot. The caps sum to exactly `max_vm_qty`.
    ///
    /// Rejects an empty profile list — the controller has nothing to
    /// manage.
    pub fn allocate(
        ordered_ids: &[String],
        configs: &std::collections::HashMap<String, ProfileConfig>,
        max_vm_qty: u32,
    ) -> Result<ProfileTable, StartupError> {
        let n = ordered_ids.len() as u32;
        if n == 0 {
            return Err(StartupError::NoProfilesFound);
        }

        let base = max_vm_qty / n;
        let extra = max_vm_qty % n;

        let mut profiles = Vec::with_capacity(ordered_ids.len());
        for (index, id) in ordered_ids.iter().enumerate() {
            let cfg = configs.get(id).expect("ordered_ids drawn from configs");
            let max_vms = base + u32::from((index as u32) < extra);
            profiles.push(Profile {
                id: id.clone(),
                queue_name: cfg.queue_name.clone(),
                spawn_args: cfg.spawn_args.clone(),
                spawn_ratio: cfg
                    .rubber_params
                    .as_ref()
                    .and_then(|p| p.spawn_ratio)
                    .unwrap_or(DEFAULT_SPAWN_RATIO),
                max_vms,
            });
        }

        Ok(ProfileTable { profiles })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RubberParams;
    use std::collections::HashMap;

    fn config(queue: &str) -> ProfileConfig {
        ProfileConfig {
            queue_name: queue.to_string(),
            spawn_args: serde_json::json!({}),
            rubber_params: Some(RubberParams { spawn_ratio: Some(0.5) }),
        }
    }

    #[test]
    fn caps_sum_to_max_vm_qty_with_remainder_to_first_profiles() {
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut configs = HashMap::new();
        configs.insert("a".to_string(), config("qa"));
        configs.insert("b".to_string(), config("qb"));
        configs.insert("c".to_string(), config("qc"));

        let table = BudgetAllocator::allocate(&ids, &configs, 7).unwrap();
        let caps: Vec<u32> = table.iter().map(Profile::max_vms).collect();
        assert_eq!(caps, vec![3, 2, 2]);
        assert_eq!(caps.iter().sum::<u32>(), 7);
    }

    #[test]
    fn even_split_gives_no_remainder() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let mut configs = HashMap::new();
        configs.insert("a".to_string(), config("qa"));
        configs.insert("b".to_string(), config("qb"));

        let table = BudgetAllocator::allocate(&ids, &configs, 4).unwrap();
        let caps: Vec<u32> = table.iter().map(Profile::max_vms).collect();
        assert_eq!(caps, vec![2, 2]);
    }

    #[test]
    fn rejects_empty_profile_set() {
        let err = BudgetAllocator::allocate(&[], &HashMap::new(), 6).unwrap_err();
        assert!(matches!(err, StartupError::NoProfilesFound));
    }
}
