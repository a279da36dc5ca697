//! Source/target volume pairing.
//!
//! Volumes are matched by role rather than by raw list position: the first
//! bootable volume of each list is the boot volume, the others are data
//! volumes numbered in listing order. Data volumes are therefore still
//! matched by ordinal.
//!
//! When only one list flags a bootable volume the flags cannot be trusted,
//! and both lists fall back to positional roles (first volume is boot).

use std::collections::BTreeMap;

use tracing;

use migrator_core::MIGRATION_TARGET;
use migrator_core::types::{VolumeDescriptor, VolumeRole};

/// A source volume and the target volume it is replicated into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumePair {
    /// Role shared by both volumes.
    pub role: VolumeRole,
    /// Source-side volume.
    pub source: VolumeDescriptor,
    /// Target-side volume.
    pub target: VolumeDescriptor,
}

/// Result of pairing two volume lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pairing {
    /// Matched pairs, in source listing order.
    pub pairs: Vec<VolumePair>,
    /// Source volumes without a target counterpart.
    pub unmatched_source: Vec<(VolumeRole, VolumeDescriptor)>,
    /// Target volumes without a source counterpart.
    pub unmatched_target: Vec<(VolumeRole, VolumeDescriptor)>,
}

impl Pairing {
    /// Number of volumes left out of the pairing.
    pub fn skipped(&self) -> usize {
        self.unmatched_source.len() + self.unmatched_target.len()
    }
}

/// Assign a role to each volume, keeping listing order.
pub fn assign_roles(volumes: Vec<VolumeDescriptor>) -> Vec<(VolumeRole, VolumeDescriptor)> {
    let mut boot_taken = false;
    let mut next_data = 0;
    volumes
        .into_iter()
        .map(|volume| {
            let role = if volume.is_bootable && !boot_taken {
                boot_taken = true;
                VolumeRole::Boot
            } else {
                let role = VolumeRole::Data(next_data);
                next_data += 1;
                role
            };
            (role, volume)
        })
        .collect()
}

/// Assign roles by position: the first volume is the boot volume.
pub fn assign_positional_roles(
    volumes: Vec<VolumeDescriptor>,
) -> Vec<(VolumeRole, VolumeDescriptor)> {
    volumes
        .into_iter()
        .enumerate()
        .map(|(index, volume)| match index {
            0 => (VolumeRole::Boot, volume),
            n => (VolumeRole::Data(n - 1), volume),
        })
        .collect()
}

fn has_boot(volumes: &[VolumeDescriptor]) -> bool {
    volumes.iter().any(|v| v.is_bootable)
}

/// Pair source and target volumes with equal roles.
pub fn pair_by_role(source: Vec<VolumeDescriptor>, target: Vec<VolumeDescriptor>) -> Pairing {
    let (source_roles, target_roles) = if has_boot(&source) == has_boot(&target) {
        (assign_roles(source), assign_roles(target))
    } else {
        tracing::warn!(
            target: MIGRATION_TARGET,
            "Bootable flag set on only one side (source: {}, target: {}), pairing volumes by position",
            has_boot(&source),
            has_boot(&target)
        );
        (
            assign_positional_roles(source),
            assign_positional_roles(target),
        )
    };

    let mut targets: BTreeMap<VolumeRole, VolumeDescriptor> = target_roles.into_iter().collect();

    let mut pairing = Pairing::default();
    for (role, source) in source_roles {
        match targets.remove(&role) {
            Some(target) => pairing.pairs.push(VolumePair {
                role,
                source,
                target,
            }),
            None => pairing.unmatched_source.push((role, source)),
        }
    }
    pairing.unmatched_target = targets.into_iter().collect();
    pairing
}
