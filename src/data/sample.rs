//! Seeded synthetic portfolio for demos and tests.
//!
//! Accounts are observed for `N_YEARS` consecutive policy years. Each
//! account draws its attributes once (size band, region, starting vehicle
//! age, historical loss ratio); claim counts are Poisson with a log-linear
//! rate in those attributes, and each claim gets a log-normal amount.
//!
//! The effects are signed to agree with the default constraint markers:
//! small accounts (`"A. Below 10"`) claim less, and a higher historical loss
//! ratio claims more.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::{LogNormal, Poisson};

use crate::domain::{Column, Frame, ModelKind, TrainConfig};
use crate::error::AppError;

pub const SIZE_BANDS: [&str; 2] = ["A. Below 10", "B. From 10"];
pub const REGIONS: [&str; 4] = ["NORTH", "SOUTH", "EAST", "WEST"];
pub const FIRST_YEAR: i64 = 2019;
pub const N_YEARS: usize = 5;

/// Share of accounts with no recorded loss history.
const MISSING_HISTORY_PROB: f64 = 0.05;

/// An account table (one row per account-year) and its claims table.
#[derive(Debug, Clone)]
pub struct SyntheticPortfolio {
    pub accounts: Frame,
    pub claims: Frame,
}

struct Account {
    id: String,
    small: bool,
    region: &'static str,
    vehicle_age: f64,
    hist_loss_ratio: f64,
}

/// Generate `n_rows` account-year rows plus their claims.
pub fn generate_portfolio(n_rows: usize, seed: u64) -> Result<SyntheticPortfolio, AppError> {
    if n_rows == 0 {
        return Err(AppError::config("Synthetic row count must be > 0."));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let n_accounts = n_rows.div_ceil(N_YEARS);
    let accounts: Vec<Account> = (0..n_accounts).map(|a| draw_account(&mut rng, a)).collect();

    let mut ids = Vec::with_capacity(n_rows);
    let mut years = Vec::with_capacity(n_rows);
    let mut ages = Vec::with_capacity(n_rows);
    let mut bands = Vec::with_capacity(n_rows);
    let mut regions = Vec::with_capacity(n_rows);
    let mut ratios = Vec::with_capacity(n_rows);
    let mut counts = Vec::with_capacity(n_rows);

    let mut claim_ids = Vec::new();
    let mut claim_accounts = Vec::new();
    let mut claim_years = Vec::new();
    let mut claim_amounts = Vec::new();

    for row in 0..n_rows {
        let account = &accounts[row / N_YEARS];
        let offset = row % N_YEARS;
        let year = FIRST_YEAR + offset as i64;
        let age = account.vehicle_age + offset as f64;

        let rate = claim_rate(account, age);
        let poisson = Poisson::new(rate)
            .map_err(|e| AppError::compute(format!("Invalid claim rate {rate}: {e}")))?;
        let count = poisson.sample(&mut rng);

        let severity = LogNormal::new(claim_log_mean(account, age), 0.8)
            .map_err(|e| AppError::compute(format!("Invalid severity distribution: {e}")))?;
        for _ in 0..count as usize {
            claim_ids.push(Some(format!("CLM{:07}", claim_ids.len() + 1)));
            claim_accounts.push(Some(account.id.clone()));
            claim_years.push(year as f64);
            claim_amounts.push((severity.sample(&mut rng) * 100.0).round() / 100.0);
        }

        ids.push(Some(account.id.clone()));
        years.push(year as f64);
        ages.push(age);
        bands.push(Some(SIZE_BANDS[usize::from(!account.small)].to_string()));
        regions.push(Some(account.region.to_string()));
        ratios.push(account.hist_loss_ratio);
        counts.push(count);
    }

    let mut frame = Frame::new();
    frame.push_column("ACCOUNT_ID", Column::Categorical(ids))?;
    frame.push_column("YEAR", Column::Numeric(years))?;
    frame.push_column("VEHICLE_AGE", Column::Numeric(ages))?;
    frame.push_column("SIZE_BAND", Column::Categorical(bands))?;
    frame.push_column("REGION", Column::Categorical(regions))?;
    frame.push_column("HIST_LOSS_RATIO", Column::Numeric(ratios))?;
    frame.push_column("CLAIM_COUNT", Column::Numeric(counts))?;

    let mut claims = Frame::new();
    claims.push_column("CLAIM_ID", Column::Categorical(claim_ids))?;
    claims.push_column("ACCOUNT_ID", Column::Categorical(claim_accounts))?;
    claims.push_column("YEAR", Column::Numeric(claim_years))?;
    claims.push_column("CLAIM_AMOUNT", Column::Numeric(claim_amounts))?;

    Ok(SyntheticPortfolio {
        accounts: frame,
        claims,
    })
}

fn draw_account(rng: &mut StdRng, index: usize) -> Account {
    let hist_loss_ratio = if rng.gen_bool(MISSING_HISTORY_PROB) {
        f64::NAN
    } else {
        // Mostly below 1, with a tail above it for the cap to act on.
        (rng.gen_range(0.0..1.0f64).powi(2) * 1.4 * 1000.0).round() / 1000.0
    };
    Account {
        id: format!("ACC{:05}", index + 1),
        small: rng.gen_bool(0.5),
        region: REGIONS[rng.gen_range(0..REGIONS.len())],
        vehicle_age: rng.gen_range(0..12) as f64,
        hist_loss_ratio,
    }
}

fn claim_rate(account: &Account, age: f64) -> f64 {
    let history = if account.hist_loss_ratio.is_nan() {
        0.3
    } else {
        account.hist_loss_ratio.min(1.0)
    };
    let region = match account.region {
        "NORTH" => 0.15,
        "SOUTH" => -0.1,
        _ => 0.0,
    };
    let small = if account.small { -0.6 } else { 0.0 };
    (-0.9 + 0.03 * age + 0.8 * history + small + region).exp()
}

fn claim_log_mean(account: &Account, age: f64) -> f64 {
    let large = if account.small { 0.0 } else { 0.35 };
    7.5 + large - 0.02 * age
}

/// A training config whose feature lists match the synthetic columns.
pub fn synthetic_config(kind: ModelKind) -> TrainConfig {
    let mut config = TrainConfig::for_kind(kind);
    config.data.numeric_features = vec!["VEHICLE_AGE".to_string(), "HIST_LOSS_RATIO".to_string()];
    config.data.one_hot_features = vec!["SIZE_BAND".to_string(), "REGION".to_string()];
    config.data.ratio_cap_column = Some("HIST_LOSS_RATIO".to_string());
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_portfolio() {
        let a = generate_portfolio(200, 9).unwrap();
        let b = generate_portfolio(200, 9).unwrap();
        assert_eq!(a.accounts, b.accounts);
        assert_eq!(a.claims, b.claims);
    }

    #[test]
    fn claim_rows_match_counts() {
        let p = generate_portfolio(300, 1).unwrap();
        assert_eq!(p.accounts.n_rows(), 300);
        let total: f64 = p.accounts.numeric("CLAIM_COUNT").unwrap().iter().sum();
        assert_eq!(p.claims.n_rows(), total as usize);
        assert!(p.claims.numeric("CLAIM_AMOUNT").unwrap().iter().all(|&v| v > 0.0));
    }

    #[test]
    fn accounts_span_consecutive_years() {
        let p = generate_portfolio(12, 3).unwrap();
        let years = p.accounts.numeric("YEAR").unwrap();
        assert_eq!(&years[..N_YEARS], &[2019.0, 2020.0, 2021.0, 2022.0, 2023.0]);
        let ids = p.accounts.column("ACCOUNT_ID").unwrap();
        assert_eq!(ids.key_at(0), ids.key_at(N_YEARS - 1));
        assert_ne!(ids.key_at(0), ids.key_at(N_YEARS));
    }

    #[test]
    fn zero_rows_is_rejected() {
        assert!(generate_portfolio(0, 1).is_err());
    }

    #[test]
    fn synthetic_config_validates() {
        synthetic_config(ModelKind::Frequency).validate().unwrap();
        synthetic_config(ModelKind::Severity).validate().unwrap();
    }
}
