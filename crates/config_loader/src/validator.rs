//! 配置校验模块
//!
//! 校验规则：
//! - 字段范围 (`validator` derive：branch_count / quota / watchdog / queue / source.*)
//! - staggered 模式下，最后一次挂载必须早于 watchdog 到期
//! - 有限数据源不足 quota 时仅告警

use contracts::{AttachMode, ScenarioConfig, StressError};
use tracing::warn;
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

/// 校验 ScenarioConfig
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &ScenarioConfig) -> Result<(), StressError> {
    if let Err(errors) = config.validate() {
        let (field, message) = first_error(&errors, "")
            .unwrap_or_else(|| (String::from("<config>"), errors.to_string()));
        return Err(StressError::config_validation(field, message));
    }
    validate_schedule(config)?;

    if let Some(units) = config.source.num_units {
        if units < config.quota {
            warn!(
                num_units = units,
                quota = config.quota,
                "finite source ends before any branch can reach its quota, iterations end on EOS"
            );
        }
    }
    Ok(())
}

/// staggered 模式：第 k 次挂载在 k × interval 时触发
fn validate_schedule(config: &ScenarioConfig) -> Result<(), StressError> {
    if config.attach_mode != AttachMode::Staggered {
        return Ok(());
    }

    let last_attach_ms = u64::from(config.attachments()).saturating_mul(config.attach_interval_ms);
    if last_attach_ms >= config.watchdog_timeout_ms {
        return Err(StressError::config_validation(
            "attach_interval_ms",
            format!(
                "staggered schedule attaches the last branch at {last_attach_ms}ms, \
                 after the {}ms watchdog",
                config.watchdog_timeout_ms
            ),
        ));
    }
    Ok(())
}

/// 按字段名排序后取第一个错误，嵌套字段用 `a.b` 表示
fn first_error(errors: &ValidationErrors, prefix: &str) -> Option<(String, String)> {
    let mut fields: Vec<_> = errors.errors().iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    for (field, kind) in fields {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };

        let found = match kind {
            ValidationErrorsKind::Field(errs) => errs.first().map(|e| (path, describe(e))),
            ValidationErrorsKind::Struct(inner) => first_error(inner, &path),
            ValidationErrorsKind::List(items) => items
                .iter()
                .find_map(|(idx, inner)| first_error(inner, &format!("{path}[{idx}]"))),
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

fn describe(error: &ValidationError) -> String {
    if let Some(message) = &error.message {
        return message.to_string();
    }

    let bound = |key: &str| error.params.get(key).map(|v| v.to_string());
    match (bound("min"), bound("max")) {
        (Some(min), Some(max)) => format!("must be between {min} and {max}"),
        (Some(min), None) => format!("must be >= {min}"),
        (None, Some(max)) => format!("must be <= {max}"),
        (None, None) => format!("failed '{}' check", error.code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_config_valid() {
        assert!(validate(&ScenarioConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_branches_rejected() {
        let config = ScenarioConfig {
            branch_count: 0,
            ..Default::default()
        };
        let err = validate(&config).unwrap_err();
        assert!(matches!(
            err,
            StressError::ConfigValidation { ref field, ref message }
                if field == "branch_count" && message.starts_with("must be >=")
        ));
    }

    #[test]
    fn test_nested_field_path() {
        let mut config = ScenarioConfig::default();
        config.source.workers = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("source.workers"), "{err}");
    }

    #[test]
    fn test_staggered_must_finish_before_watchdog() {
        // 199 attachments x 500ms = 99.5s, watchdog 35s
        let config = ScenarioConfig {
            attach_mode: AttachMode::Staggered,
            ..Default::default()
        };
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("attach_interval_ms"));

        let config = ScenarioConfig {
            attach_mode: AttachMode::Staggered,
            attach_interval_ms: 100,
            ..Default::default()
        };
        assert!(validate(&config).is_ok());
    }
}
