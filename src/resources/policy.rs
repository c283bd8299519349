use crate::api::v1alpha2::CommonSpec;
use crate::util::config::OperatorConfig;
use crate::util::errors::{Error, Result};

use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;
use tracing::debug;

pub const PULL_ALWAYS: &str = "Always";
pub const PULL_IF_NOT_PRESENT: &str = "IfNotPresent";
pub const DEFAULT_SCHEDULER: &str = "default-scheduler";

pub const RESOURCE_CPU: &str = "cpu";
pub const RESOURCE_MEMORY: &str = "memory";

/// Resolves an image pull policy against the configured override and the default.
pub fn validate_image_pull_policy(value: &str, config: &OperatorConfig) -> Result<String> {
    let policy = if value.is_empty() {
        config.image_pull_policy.as_deref().unwrap_or_default()
    } else {
        value
    };

    match policy {
        "" => Ok(PULL_IF_NOT_PRESENT.to_string()),
        PULL_ALWAYS | PULL_IF_NOT_PRESENT => Ok(policy.to_string()),
        other => Err(Error::InvalidImagePullPolicy(other.to_string())),
    }
}

/// Fills in cpu and memory requests and limits that the caller left unset.
pub fn validate_resources(resources: &ResourceRequirements, defaults: &ResourceRequirements) -> ResourceRequirements {
    let mut validated = resources.clone();

    let requests = validated.requests.get_or_insert_with(BTreeMap::new);
    fill_defaults(requests, defaults.requests.as_ref());

    let limits = validated.limits.get_or_insert_with(BTreeMap::new);
    fill_defaults(limits, defaults.limits.as_ref());

    validated
}

fn fill_defaults(target: &mut BTreeMap<String, Quantity>, defaults: Option<&BTreeMap<String, Quantity>>) {
    for dimension in [RESOURCE_CPU, RESOURCE_MEMORY] {
        if target.contains_key(dimension) {
            continue;
        }
        if let Some(default) = defaults.and_then(|d| d.get(dimension)) {
            debug!("defaulting {} to {}", dimension, default.0);
            target.insert(dimension.to_string(), default.clone());
        }
    }
}

/// Defaults and validates the fields shared by every Splunk role.
pub fn validate_common_spec(
    spec: &CommonSpec,
    default_resources: &ResourceRequirements,
    config: &OperatorConfig,
) -> Result<CommonSpec> {
    let mut validated = spec.clone();

    if validated.scheduler_name.is_empty() {
        validated.scheduler_name = DEFAULT_SCHEDULER.to_string();
    }

    validated.resources = validate_resources(&spec.resources, default_resources);
    validated.image_pull_policy = validate_image_pull_policy(&spec.image_pull_policy, config)?;

    Ok(validated)
}

/// Parses a resource quantity, substituting `use_if_empty` for an empty value.
pub fn parse_resource_quantity(value: &str, use_if_empty: &str) -> Result<Option<Quantity>> {
    let value = if value.is_empty() { use_if_empty } else { value };
    if value.is_empty() {
        return Ok(None);
    }

    parse_nanos(value).map_err(|reason| Error::InvalidResourceQuantity {
        value: value.to_string(),
        reason,
    })?;
    Ok(Some(Quantity(value.to_string())))
}

/// Returns the value of a quantity in billionths of a unit.
///
/// Differently spelled quantities such as "1024Mi" and "1Gi" yield the same value.
/// Fractions of a billionth round up, as the API server does.
pub fn quantity_nanos(quantity: &Quantity) -> Result<i128> {
    parse_nanos(&quantity.0).map_err(|reason| Error::InvalidResourceQuantity {
        value: quantity.0.clone(),
        reason,
    })
}

fn parse_nanos(value: &str) -> std::result::Result<i128, String> {
    let (negative, unsigned) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    let number_end = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(number_end);

    if number.is_empty() || number == "." || number.matches('.').count() > 1 {
        return Err("quantities must match the regular expression '^([+-]?[0-9.]+)([eEinumkKMGTP]*[-+]?[0-9]*)$'".to_string());
    }

    let (binary_power, exponent) = suffix_scale(suffix)?;
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    let out_of_range = || format!("quantity \"{}\" is out of range", value);

    let mut mantissa: i128 = 0;
    for digit in whole.bytes().chain(fraction.bytes()) {
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add(i128::from(digit - b'0')))
            .ok_or_else(out_of_range)?;
    }
    mantissa = mantissa.checked_mul(1i128 << binary_power).ok_or_else(out_of_range)?;

    let scale = exponent + 9 - fraction.len() as i32;
    let nanos = if scale >= 0 {
        10i128
            .checked_pow(scale.unsigned_abs())
            .and_then(|factor| mantissa.checked_mul(factor))
            .ok_or_else(out_of_range)?
    } else {
        match 10i128.checked_pow(scale.unsigned_abs()) {
            Some(divisor) => mantissa / divisor + i128::from(mantissa % divisor != 0),
            None => i128::from(mantissa != 0),
        }
    };

    Ok(if negative { -nanos } else { nanos })
}

/// Maps a quantity suffix to (binary power, decimal exponent).
fn suffix_scale(suffix: &str) -> std::result::Result<(u32, i32), String> {
    let scale = match suffix {
        "" => (0, 0),
        "Ki" => (10, 0),
        "Mi" => (20, 0),
        "Gi" => (30, 0),
        "Ti" => (40, 0),
        "Pi" => (50, 0),
        "Ei" => (60, 0),
        "n" => (0, -9),
        "u" => (0, -6),
        "m" => (0, -3),
        "k" => (0, 3),
        "M" => (0, 6),
        "G" => (0, 9),
        "T" => (0, 12),
        "P" => (0, 15),
        "E" => (0, 18),
        other => {
            let exponent = other
                .strip_prefix(['e', 'E'])
                .filter(|e| {
                    let digits = e.strip_prefix(['+', '-']).unwrap_or(e);
                    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
                })
                .and_then(|e| e.parse::<i32>().ok())
                .ok_or_else(|| format!("unable to parse quantity's suffix \"{}\"", other))?;
            (0, exponent)
        }
    };
    Ok(scale)
}

/// Builds default resource requirements from quantity strings; empty strings leave a dimension unset.
pub fn default_resources(
    cpu_request: &str,
    memory_request: &str,
    cpu_limit: &str,
    memory_limit: &str,
) -> Result<ResourceRequirements> {
    Ok(ResourceRequirements {
        requests: Some(quantities(cpu_request, memory_request)?),
        limits: Some(quantities(cpu_limit, memory_limit)?),
        ..Default::default()
    })
}

fn quantities(cpu: &str, memory: &str) -> Result<BTreeMap<String, Quantity>> {
    let mut map = BTreeMap::new();
    for (dimension, value) in [(RESOURCE_CPU, cpu), (RESOURCE_MEMORY, memory)] {
        if let Some(quantity) = parse_resource_quantity(value, "")? {
            map.insert(dimension.to_string(), quantity);
        }
    }
    Ok(map)
}
