use thiserror::Error;

#[derive(Clone, Error, Debug, Eq, PartialEq)]
pub enum QuantityParseError {
    #[error("Invalid cpu quantity `{raw}`")]
    InvalidCpu { raw: String },
    #[error("Invalid memory quantity `{raw}`")]
    InvalidMemory { raw: String },
}

/// parse a cpu string (kubernetes like) into a float. It supports millis cpu
/// examples:
/// 250m = 0.25 cpu
/// 500m = 0.50 cpu
/// 2000m = 2 cpu
/// 1.25 = 1.25
pub fn parse_cpu_quantity(cpu: &str) -> Result<f64, QuantityParseError> {
    let invalid = || QuantityParseError::InvalidCpu { raw: cpu.to_string() };
    let trimmed = cpu.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    if let Some(millis) = trimmed.strip_suffix('m') {
        return match millis.parse::<f64>() {
            Ok(v) if v >= 0.0 => Ok(v / 1000.0),
            _ => Err(invalid()),
        };
    }

    match trimmed.parse::<f64>() {
        Ok(v) if v >= 0.0 => Ok(v),
        _ => Err(invalid()),
    }
}

/// parse a memory string (kubernetes like) into bytes. Suffixes are powers
/// of 1024; a bare number is raw bytes.
/// examples:
/// 1Ki = 1024
/// 1Mi = 1048576
/// 1Gi = 1073741824
pub fn parse_memory_quantity(memory: &str) -> Result<u64, QuantityParseError> {
    let invalid = || QuantityParseError::InvalidMemory {
        raw: memory.to_string(),
    };
    let trimmed = memory.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let (digits, multiplier) = if let Some(d) = trimmed.strip_suffix("Ki") {
        (d, 1024u64)
    } else if let Some(d) = trimmed.strip_suffix("Mi") {
        (d, 1024u64 * 1024)
    } else if let Some(d) = trimmed.strip_suffix("Gi") {
        (d, 1024u64 * 1024 * 1024)
    } else {
        (trimmed, 1u64)
    };

    match digits.parse::<u64>() {
        Ok(v) => v.checked_mul(multiplier).ok_or_else(invalid),
        Err(_) => Err(invalid()),
    }
}
