use std::sync::OnceLock;

static QUIET: OnceLock<bool> = OnceLock::new();

/// Whether informational output is suppressed (`METASTORE_QUIET=1`)
pub fn is_quiet() -> bool {
    *QUIET.get_or_init(|| {
        std::env::var("METASTORE_QUIET")
            .map(|v| quiet_value(&v))
            .unwrap_or(false)
    })
}

fn quiet_value(v: &str) -> bool {
    v == "1" || v.eq_ignore_ascii_case("true")
}
