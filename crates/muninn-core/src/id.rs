//! Prefixed ULID identifiers: `ses_`, `pat_`, `fnd_`, `ack_`, `seg_`.

fn prefixed(prefix: &str) -> String {
    format!("{prefix}_{}", ulid::Ulid::new().to_string().to_lowercase())
}

pub fn session() -> String {
    prefixed("ses")
}

pub fn pattern() -> String {
    prefixed("pat")
}

pub fn finding() -> String {
    prefixed("fnd")
}

pub fn ack() -> String {
    prefixed("ack")
}

pub fn segment() -> String {
    prefixed("seg")
}
