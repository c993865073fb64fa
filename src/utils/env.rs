fn read_float_and_factor_from_str(value: &str) -> Option<(f64, usize)> {
    let mut value = value.trim();
    if value.is_empty() {
        return None;
    }
    if value.len() > 1 && (value.ends_with('b') || value.ends_with('B')) {
        value = &value[..value.len() - 1];
    }

    let (digits, factor) = match value.as_bytes()[value.len() - 1] {
        b'g' | b'G' => (&value[..value.len() - 1], 1024 * 1024 * 1024),
        b'm' | b'M' => (&value[..value.len() - 1], 1024 * 1024),
        b'k' | b'K' => (&value[..value.len() - 1], 1024),
        _ => (value, 1),
    };

    digits.parse::<f64>().ok().map(|x| (x, factor))
}

/// Parses a size such as `512`, `64k`, `2M` or `1gb`.
pub fn read_uint_from_str(value: &str) -> Option<usize> {
    let (value, factor) = read_float_and_factor_from_str(value)?;
    if value < 0.0 || !value.is_finite() {
        return None;
    }
    Some((value * factor as f64) as usize)
}

pub fn read_uint_from_env(var: &str) -> Option<usize> {
    read_uint_from_str(&std::env::var(var).ok()?)
}
