// SPDX-License-Identifier: MIT OR Apache-2.0
//! Strategy payloads ↔ record-set encoding.
//!
//! The dotted record names used here are the payload contract between the
//! round driver and the client application: `fitins.*` on the way out,
//! `fitres.*` / `evaluateres.*` on the way back.

use crate::{EvaluateIns, EvaluateRes, FitIns, FitRes, MetricsMap, StrategyError};
use fed_record::{ConfigValue, ConfigsRecord, MetricsRecord, MetricsValue, RecordSet};
use fed_task::{
    parameters_record_to_parameters, parameters_to_parameters_record, Parameters, Status,
    StatusCode, embed_status,
};
use std::collections::BTreeMap;

/// Record name for outgoing fit parameters.
pub const FITINS_PARAMETERS: &str = "fitins.parameters";
/// Record name for outgoing fit config.
pub const FITINS_CONFIG: &str = "fitins.config";
/// Record name for returned fit parameters.
pub const FITRES_PARAMETERS: &str = "fitres.parameters";
/// Record name for returned fit metrics.
pub const FITRES_METRICS: &str = "fitres.metrics";
/// Record name for returned example counts and status.
pub const FITRES: &str = "fitres";
/// Record name for outgoing evaluate parameters.
pub const EVALUATEINS_PARAMETERS: &str = "evaluateins.parameters";
/// Record name for outgoing evaluate config.
pub const EVALUATEINS_CONFIG: &str = "evaluateins.config";
/// Record name for returned evaluate metrics.
pub const EVALUATERES_METRICS: &str = "evaluateres.metrics";
/// Record name for returned loss, example counts, and status.
pub const EVALUATERES: &str = "evaluateres";

fn configs_from_map(map: &BTreeMap<String, ConfigValue>) -> ConfigsRecord {
    let mut rec = ConfigsRecord::new();
    for (k, v) in map {
        rec.insert(k.clone(), v.clone());
    }
    rec
}

fn map_from_configs(rec: &ConfigsRecord) -> BTreeMap<String, ConfigValue> {
    rec.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn metrics_from_map(map: &MetricsMap) -> MetricsRecord {
    let mut rec = MetricsRecord::new();
    for (k, v) in map {
        rec.insert(k.clone(), v.clone());
    }
    rec
}

fn map_from_metrics(rec: &MetricsRecord) -> MetricsMap {
    rec.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn require_parameters(recordset: &RecordSet, name: &str) -> Result<Parameters, StrategyError> {
    let record =
        recordset
            .parameters_records
            .get(name)
            .ok_or_else(|| StrategyError::MalformedPayload {
                reason: format!("missing parameters record '{name}'"),
            })?;
    Ok(parameters_record_to_parameters(record))
}

fn require_u64(recordset: &RecordSet, record: &str, key: &str) -> Result<u64, StrategyError> {
    let rec =
        recordset
            .configs_records
            .get(record)
            .ok_or_else(|| StrategyError::MalformedPayload {
                reason: format!("missing configs record '{record}'"),
            })?;
    match rec.get(key) {
        Some(ConfigValue::Int(v)) if *v >= 0 => Ok(*v as u64),
        Some(_) => Err(StrategyError::MalformedPayload {
            reason: format!("'{record}.{key}' is not a non-negative integer"),
        }),
        None => Err(StrategyError::MalformedPayload {
            reason: format!("missing '{record}.{key}'"),
        }),
    }
}

/// Encode a [`FitIns`] into the record set carried by a task instruction.
#[must_use]
pub fn fit_ins_to_recordset(ins: &FitIns) -> RecordSet {
    let mut rs = RecordSet::new();
    rs.parameters_records.insert(
        FITINS_PARAMETERS.into(),
        parameters_to_parameters_record(&ins.parameters),
    );
    rs.configs_records
        .insert(FITINS_CONFIG.into(), configs_from_map(&ins.config));
    rs
}

/// Decode the [`FitIns`] out of an incoming record set.
///
/// # Errors
///
/// Returns [`StrategyError::MalformedPayload`] when the `fitins.*`
/// records are absent.
pub fn recordset_to_fit_ins(recordset: &RecordSet) -> Result<FitIns, StrategyError> {
    Ok(FitIns {
        parameters: require_parameters(recordset, FITINS_PARAMETERS)?,
        config: recordset
            .configs_records
            .get(FITINS_CONFIG)
            .map(map_from_configs)
            .unwrap_or_default(),
    })
}

/// Encode a [`FitRes`] (with an `ok` status) into a reply record set.
#[must_use]
pub fn fit_res_to_recordset(res: &FitRes) -> RecordSet {
    let mut rs = RecordSet::new();
    rs.parameters_records.insert(
        FITRES_PARAMETERS.into(),
        parameters_to_parameters_record(&res.parameters),
    );
    rs.metrics_records
        .insert(FITRES_METRICS.into(), metrics_from_map(&res.metrics));
    let mut counts = ConfigsRecord::new();
    counts.insert("num_examples", res.num_examples as i64);
    rs.configs_records.insert(FITRES.into(), counts);
    embed_status(&mut rs, FITRES, &Status::ok());
    rs
}

/// Decode the [`FitRes`] out of a reply record set.
///
/// # Errors
///
/// Returns [`StrategyError::MalformedPayload`] when the `fitres.*`
/// records are absent or mistyped.
pub fn recordset_to_fit_res(recordset: &RecordSet) -> Result<FitRes, StrategyError> {
    Ok(FitRes {
        parameters: require_parameters(recordset, FITRES_PARAMETERS)?,
        num_examples: require_u64(recordset, FITRES, "num_examples")?,
        metrics: recordset
            .metrics_records
            .get(FITRES_METRICS)
            .map(map_from_metrics)
            .unwrap_or_default(),
    })
}

/// Encode an [`EvaluateIns`] into the record set carried by a task
/// instruction.
#[must_use]
pub fn evaluate_ins_to_recordset(ins: &EvaluateIns) -> RecordSet {
    let mut rs = RecordSet::new();
    rs.parameters_records.insert(
        EVALUATEINS_PARAMETERS.into(),
        parameters_to_parameters_record(&ins.parameters),
    );
    rs.configs_records
        .insert(EVALUATEINS_CONFIG.into(), configs_from_map(&ins.config));
    rs
}

/// Decode the [`EvaluateIns`] out of an incoming record set.
///
/// # Errors
///
/// Returns [`StrategyError::MalformedPayload`] when the `evaluateins.*`
/// records are absent.
pub fn recordset_to_evaluate_ins(recordset: &RecordSet) -> Result<EvaluateIns, StrategyError> {
    Ok(EvaluateIns {
        parameters: require_parameters(recordset, EVALUATEINS_PARAMETERS)?,
        config: recordset
            .configs_records
            .get(EVALUATEINS_CONFIG)
            .map(map_from_configs)
            .unwrap_or_default(),
    })
}

/// Encode an [`EvaluateRes`] (with an `ok` status) into a reply record set.
#[must_use]
pub fn evaluate_res_to_recordset(res: &EvaluateRes) -> RecordSet {
    let mut rs = RecordSet::new();
    let mut summary = MetricsRecord::new();
    summary.insert("loss", res.loss);
    rs.metrics_records.insert(format!("{EVALUATERES}.loss"), summary);
    rs.metrics_records
        .insert(EVALUATERES_METRICS.into(), metrics_from_map(&res.metrics));
    let mut counts = ConfigsRecord::new();
    counts.insert("num_examples", res.num_examples as i64);
    rs.configs_records.insert(EVALUATERES.into(), counts);
    embed_status(&mut rs, EVALUATERES, &Status::ok());
    rs
}

/// Decode the [`EvaluateRes`] out of a reply record set.
///
/// # Errors
///
/// Returns [`StrategyError::MalformedPayload`] when the `evaluateres.*`
/// records are absent or mistyped.
pub fn recordset_to_evaluate_res(recordset: &RecordSet) -> Result<EvaluateRes, StrategyError> {
    let loss = recordset
        .metrics_records
        .get(&format!("{EVALUATERES}.loss"))
        .and_then(|rec| match rec.get("loss") {
            Some(MetricsValue::Double(v)) => Some(*v),
            Some(MetricsValue::Int(v)) => Some(*v as f64),
            _ => None,
        })
        .ok_or_else(|| StrategyError::MalformedPayload {
            reason: "missing 'evaluateres.loss'".into(),
        })?;
    Ok(EvaluateRes {
        loss,
        num_examples: require_u64(recordset, EVALUATERES, "num_examples")?,
        metrics: recordset
            .metrics_records
            .get(EVALUATERES_METRICS)
            .map(map_from_metrics)
            .unwrap_or_default(),
    })
}

/// Build a failure reply record set carrying only a status.
#[must_use]
pub fn failure_recordset(result_name: &str, code: StatusCode, message: &str) -> RecordSet {
    let mut rs = RecordSet::new();
    embed_status(&mut rs, result_name, &Status::new(code, message));
    rs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::vecs_to_parameters;
    use fed_task::extract_status;

    #[test]
    fn fit_ins_roundtrip() {
        let mut config = BTreeMap::new();
        config.insert("local_epochs".to_string(), ConfigValue::Int(2));
        let ins = FitIns {
            parameters: vecs_to_parameters(&[vec![1.0, 2.0]]),
            config,
        };
        let rs = fit_ins_to_recordset(&ins);
        assert_eq!(recordset_to_fit_ins(&rs).unwrap(), ins);
    }

    #[test]
    fn fit_res_roundtrip_carries_ok_status() {
        let mut metrics = MetricsMap::new();
        metrics.insert("accuracy".to_string(), MetricsValue::Double(0.9));
        let res = FitRes {
            parameters: vecs_to_parameters(&[vec![0.5]]),
            num_examples: 64,
            metrics,
        };
        let rs = fit_res_to_recordset(&res);
        assert_eq!(recordset_to_fit_res(&rs).unwrap(), res);
        assert_eq!(extract_status(&rs, FITRES).unwrap().code, StatusCode::Ok);
    }

    #[test]
    fn evaluate_res_roundtrip() {
        let res = EvaluateRes {
            loss: 0.125,
            num_examples: 32,
            metrics: MetricsMap::new(),
        };
        let rs = evaluate_res_to_recordset(&res);
        assert_eq!(recordset_to_evaluate_res(&rs).unwrap(), res);
    }

    #[test]
    fn missing_parameters_record_is_malformed() {
        let rs = RecordSet::new();
        let err = recordset_to_fit_ins(&rs).unwrap_err();
        assert!(matches!(err, StrategyError::MalformedPayload { .. }));
    }

    #[test]
    fn failure_recordset_carries_status_only() {
        let rs = failure_recordset(FITRES, StatusCode::ExecutionFailed, "boom");
        let status = extract_status(&rs, FITRES).unwrap();
        assert_eq!(status.code, StatusCode::ExecutionFailed);
        assert_eq!(status.message, "boom");
        assert!(rs.parameters_records.is_empty());
    }
}
