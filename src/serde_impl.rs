use serde::de::{self, Deserialize, Deserializer};

/// Deserialize a single byte written as a one character string.
pub(crate) fn deserialize_byte<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    to_byte(&s)
}

/// Deserialize an optional single byte written as a one character string.
pub(crate) fn deserialize_opt_byte<'de, D>(
    deserializer: D,
) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) => to_byte(&s).map(Some),
    }
}

fn to_byte<E: de::Error>(s: &str) -> Result<u8, E> {
    match s.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(E::custom(format!(
            "expected a single ASCII character, but found {:?}",
            s
        ))),
    }
}
