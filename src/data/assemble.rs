//! Joining account and claims tables into model frames.
//!
//! Both joins key rows by `(account id, year)`:
//!
//! - frequency: one row per account-year, target = number of claims
//! - severity: one row per claim with a positive amount, carrying the
//!   attributes of its account-year

use std::collections::HashMap;

use tracing::{info, warn};

use crate::domain::{Column, DataConfig, Frame};
use crate::error::{AppError, missing_columns_error};

/// An assembled frame and how many claim rows could not be used.
#[derive(Debug, Clone)]
pub struct Assembled {
    pub frame: Frame,
    pub unmatched_claims: usize,
    pub dropped_claims: usize,
}

fn key_columns(data: &DataConfig) -> Vec<String> {
    vec![data.id_column.clone(), data.year_column.clone()]
}

fn row_keys(frame: &Frame, data: &DataConfig, context: &str) -> Result<Vec<String>, AppError> {
    let required = key_columns(data);
    let missing = frame.missing_columns(&required);
    if !missing.is_empty() {
        return Err(missing_columns_error(context, &missing, frame.names()));
    }
    let (Some(ids), Some(years)) = (frame.column(&data.id_column), frame.column(&data.year_column)) else {
        return Err(missing_columns_error(context, &required, frame.names()));
    };
    Ok((0..frame.n_rows())
        .map(|i| format!("{}|{}", ids.key_at(i), years.key_at(i)))
        .collect())
}

/// Account-year rows with `target_column` set to the joined claim count.
pub fn frequency_frame(accounts: &Frame, claims: &Frame, data: &DataConfig) -> Result<Assembled, AppError> {
    let account_keys = row_keys(accounts, data, "accounts")?;
    let claim_keys = row_keys(claims, data, "claims")?;

    let mut counts: HashMap<&str, f64> = account_keys.iter().map(|k| (k.as_str(), 0.0)).collect();
    let mut unmatched = 0usize;
    for key in &claim_keys {
        match counts.get_mut(key.as_str()) {
            Some(c) => *c += 1.0,
            None => unmatched += 1,
        }
    }
    if unmatched > 0 {
        warn!(unmatched, "claims without a matching account-year");
    }

    let target: Vec<f64> = account_keys
        .iter()
        .map(|k| counts.get(k.as_str()).copied().unwrap_or(0.0))
        .collect();
    let mut frame = accounts.clone();
    frame.set_column(&data.target_column, Column::Numeric(target))?;

    info!(rows = frame.n_rows(), claims = claims.n_rows(), unmatched, "assembled frequency frame");
    Ok(Assembled {
        frame,
        unmatched_claims: unmatched,
        dropped_claims: 0,
    })
}

/// One row per claim with a positive amount, joined to its account-year.
///
/// `target_column` names the amount column of `claims`.
pub fn severity_frame(accounts: &Frame, claims: &Frame, data: &DataConfig) -> Result<Assembled, AppError> {
    let account_keys = row_keys(accounts, data, "accounts")?;
    let claim_keys = row_keys(claims, data, "claims")?;
    if !claims.has(&data.target_column) {
        return Err(missing_columns_error(
            "claims",
            std::slice::from_ref(&data.target_column),
            claims.names(),
        ));
    }
    let amounts = claims.numeric(&data.target_column)?;

    // Later duplicates of an account-year lose to the first occurrence.
    let mut first_row: HashMap<&str, usize> = HashMap::with_capacity(account_keys.len());
    for (i, k) in account_keys.iter().enumerate() {
        first_row.entry(k.as_str()).or_insert(i);
    }

    let mut rows = Vec::with_capacity(claim_keys.len());
    let mut target = Vec::with_capacity(claim_keys.len());
    let mut unmatched = 0usize;
    let mut dropped = 0usize;
    for (key, &amount) in claim_keys.iter().zip(amounts) {
        if !(amount.is_finite() && amount > 0.0) {
            dropped += 1;
            continue;
        }
        match first_row.get(key.as_str()) {
            Some(&row) => {
                rows.push(row);
                target.push(amount);
            }
            None => unmatched += 1,
        }
    }
    if rows.is_empty() {
        return Err(AppError::data(format!(
            "No claims with a positive amount matched an account-year ({} claims read).",
            claims.n_rows()
        )));
    }
    if unmatched > 0 {
        warn!(unmatched, "claims without a matching account-year");
    }

    let mut frame = accounts.take(&rows);
    frame.set_column(&data.target_column, Column::Numeric(target))?;

    info!(rows = frame.n_rows(), unmatched, dropped, "assembled severity frame");
    Ok(Assembled {
        frame,
        unmatched_claims: unmatched,
        dropped_claims: dropped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(values: &[&str]) -> Column {
        Column::Categorical(values.iter().map(|v| Some(v.to_string())).collect())
    }

    fn accounts() -> Frame {
        let mut f = Frame::new();
        f.push_column("ACCOUNT_ID", cat(&["a", "a", "b"])).unwrap();
        f.push_column("YEAR", Column::Numeric(vec![2020.0, 2021.0, 2020.0])).unwrap();
        f.push_column("AGE", Column::Numeric(vec![1.0, 2.0, 5.0])).unwrap();
        f
    }

    fn claims() -> Frame {
        let mut f = Frame::new();
        f.push_column("ACCOUNT_ID", cat(&["a", "a", "b", "z", "b"])).unwrap();
        f.push_column("YEAR", Column::Numeric(vec![2020.0, 2020.0, 2020.0, 2020.0, 2020.0]))
            .unwrap();
        f.push_column("CLAIM_AMOUNT", Column::Numeric(vec![100.0, 50.0, 0.0, 10.0, 70.0]))
            .unwrap();
        f
    }

    #[test]
    fn frequency_counts_claims_per_account_year() {
        let data = DataConfig::default();
        let out = frequency_frame(&accounts(), &claims(), &data).unwrap();
        assert_eq!(out.frame.numeric("CLAIM_COUNT").unwrap(), &[2.0, 0.0, 2.0]);
        assert_eq!(out.unmatched_claims, 1);
    }

    #[test]
    fn severity_keeps_positive_matched_claims() {
        let data = DataConfig {
            target_column: "CLAIM_AMOUNT".to_string(),
            ..DataConfig::default()
        };
        let out = severity_frame(&accounts(), &claims(), &data).unwrap();
        assert_eq!(out.frame.n_rows(), 3);
        assert_eq!(out.frame.numeric("CLAIM_AMOUNT").unwrap(), &[100.0, 50.0, 70.0]);
        assert_eq!(out.frame.numeric("AGE").unwrap(), &[1.0, 1.0, 5.0]);
        assert_eq!(out.unmatched_claims, 1);
        assert_eq!(out.dropped_claims, 1);
    }

    #[test]
    fn missing_key_column_is_named() {
        let mut f = Frame::new();
        f.push_column("ACCOUNT_ID", cat(&["a"])).unwrap();
        let err = frequency_frame(&f, &claims(), &DataConfig::default()).unwrap_err();
        assert!(err.message().contains("YEAR"), "{}", err.message());
    }
}
