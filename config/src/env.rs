use std::env;
use std::path::PathBuf;

/// `STRATA_*` values that take precedence over `strata.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub app: Option<String>,
    pub host: Option<String>,
    /// Kept as text so a malformed value is reported, not ignored.
    pub port: Option<String>,
    pub env_dir: Option<String>,
    pub cache_dir: Option<String>,
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

impl Overrides {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            config: non_empty("STRATA_CONFIG").map(PathBuf::from),
            app: non_empty("STRATA_APP"),
            host: non_empty("STRATA_HOST"),
            port: non_empty("STRATA_PORT"),
            env_dir: non_empty("STRATA_ENV_DIR"),
            cache_dir: non_empty("STRATA_CACHE_DIR"),
        }
    }
}

/// Replace `${VAR}` with the variable's value; unset variables expand to
/// nothing and an unclosed `${` is kept literally.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::expand_env_vars;

    #[test]
    fn plain_text_is_unchanged() {
        assert_eq!(expand_env_vars("app.main:app"), "app.main:app");
    }

    #[test]
    fn expands_set_and_unset_vars() {
        unsafe {
            std::env::set_var("STRATA_TEST_EXPAND_DIR", "/srv");
            std::env::remove_var("STRATA_TEST_EXPAND_MISSING");
        }
        assert_eq!(
            expand_env_vars("${STRATA_TEST_EXPAND_DIR}/venv"),
            "/srv/venv"
        );
        assert_eq!(
            expand_env_vars("a${STRATA_TEST_EXPAND_MISSING}b"),
            "ab"
        );
        unsafe {
            std::env::remove_var("STRATA_TEST_EXPAND_DIR");
        }
    }

    #[test]
    fn unclosed_brace_preserved() {
        assert_eq!(expand_env_vars("x ${UNCLOSED"), "x ${UNCLOSED");
        assert_eq!(expand_env_vars("x ${} y"), "x  y");
    }
}
