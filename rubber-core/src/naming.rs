//! VM naming.

/// Downstream DNS-label limit a normalized VM name may not exceed.
pub const MAX_VM_NAME_LEN: usize = 54;

/// A normalized name exceeded [`MAX_VM_NAME_LEN`]. Fatal for the spawn
/// that produced it, not for the controller as a whole.
#[derive(Debug, Clone)]
pub struct VmNameTooLong(pub String);

impl std::fmt::Display for VmNameTooLong {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "normalized VM name too long ({} chars): {}", self.0.len(), self.0)
    }
}

impl std::error::Error for VmNameTooLong {}

/// Lower-case, replace `_` with `-`, reject names over [`MAX_VM_NAME_LEN`].
pub fn normalize_vm_name(raw: &str) -> Result<String, VmNameTooLong> {
    let name = raw.replace('_', "-").to_lowercase();
    if name.len() > MAX_VM_NAME_LEN {
        return Err(VmNameTooLong(name));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_replaces_underscores() {
        let name = normalize_vm_name("Ingest_Queue-ABCD1234").unwrap();
        assert_eq!(name, "ingest-queue-abcd1234");
    }

    #[test]
    fn rejects_names_over_the_limit() {
        let raw = "a".repeat(55);
        let err = normalize_vm_name(&raw).unwrap_err();
        assert_eq!(err.0.len(), 55);
    }

    #[test]
    fn accepts_exactly_at_the_limit() {
        let raw = "a".repeat(MAX_VM_NAME_LEN);
        assert!(normalize_vm_name(&raw).is_ok());
    }
}
