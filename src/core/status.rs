// Status-code resolution: engine description first, stable fallback always.
use crate::core::engine::{Engine, RawStatus, STATUS_OK};

/// Resolve a status code into a non-empty diagnostic string. Prefers the
/// engine's own description; unknown or undescribed codes fall back to a
/// stable local string rather than failing.
pub fn resolve(engine: &dyn Engine, code: RawStatus) -> String {
    match engine.describe_status(code) {
        Some(text) if !text.is_empty() => text,
        _ => fallback(code),
    }
}

fn fallback(code: RawStatus) -> String {
    if code == STATUS_OK {
        "success".to_string()
    } else {
        format!("unknown status code {code}")
    }
}

#[cfg(test)]
mod tests {
    use super::{fallback, resolve};
    use crate::core::engine::{Engine, EngineSession, RawStatus};

    struct DescribeOnly;

    impl Engine for DescribeOnly {
        fn open(&self) -> Result<Box<dyn EngineSession>, RawStatus> {
            Err(-1)
        }

        fn describe_status(&self, code: RawStatus) -> Option<String> {
            match code {
                0 => Some("ok".to_string()),
                7 => Some("object not found".to_string()),
                8 => Some(String::new()),
                _ => None,
            }
        }
    }

    #[test]
    fn engine_description_wins() {
        assert_eq!(resolve(&DescribeOnly, 7), "object not found");
        assert_eq!(resolve(&DescribeOnly, 0), "ok");
    }

    #[test]
    fn unknown_code_gets_stable_fallback() {
        assert_eq!(resolve(&DescribeOnly, 999), "unknown status code 999");
    }

    #[test]
    fn empty_description_is_treated_as_missing() {
        assert_eq!(resolve(&DescribeOnly, 8), "unknown status code 8");
    }

    #[test]
    fn success_fallback_indicates_success() {
        assert_eq!(fallback(0), "success");
    }
}
