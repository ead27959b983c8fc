//! Decisions on whether an optional sub-record is created at all.

use crate::constants::IUD_MARKER;

/// A pelvic exam is recorded only for intrauterine device methods.
///
/// The marker is matched case-sensitively, so `"IUD-I"` and `"IUD-PP"` qualify while a
/// lower-case `"iud"` typed as free text does not.
pub fn requires_pelvic_exam(method_currently_used: &str) -> bool {
    method_currently_used.contains(IUD_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iud_methods_require_pelvic_exam() {
        assert!(requires_pelvic_exam("IUD"));
        assert!(requires_pelvic_exam("IUD-I"));
        assert!(requires_pelvic_exam("IUD-PP"));
        assert!(requires_pelvic_exam("Switching to IUD"));
    }

    #[test]
    fn test_other_methods_skip_pelvic_exam() {
        for method in ["Pills", "None", "", "DMPA", "Condom", "BTL"] {
            assert!(!requires_pelvic_exam(method), "{method} should not gate in");
        }
    }

    #[test]
    fn test_marker_is_case_sensitive() {
        assert!(!requires_pelvic_exam("iud"));
        assert!(!requires_pelvic_exam("Iud-I"));
    }
}
