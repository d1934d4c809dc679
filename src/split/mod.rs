//! Train/validation/test partitioning.
//!
//! Every strategy produces a `Partition` of row indices. A shared `verify`
//! step then checks the partition before rows are materialized:
//!
//! - indices are in range and appear in at most one partition
//! - for grouped splits, the three account sets are pairwise disjoint and
//!   every row sits in the partition that owns its account
//!
//! Cut sizes use integer truncation (`floor(n * ratio)`); the last non-empty
//! partition absorbs the remainder. All randomness comes from one seeded
//! `StdRng`, so the same seed and input order reproduce the same partition.

use std::collections::{BTreeMap, HashMap, HashSet};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::domain::{DataConfig, Frame, SplitConfig, SplitStrategy};
use crate::error::AppError;

/// Account identifiers owned by each partition (grouped splits only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSets {
    pub train: Vec<String>,
    pub val: Vec<String>,
    pub test: Vec<String>,
}

/// Row indices of each partition, ascending within a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
    pub test: Vec<usize>,
    pub groups: Option<GroupSets>,
}

impl Partition {
    /// Rows covered by the partition (the filtered input size).
    pub fn n_rows(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    /// Check disjointness and range against a frame of `n_rows` rows.
    pub fn verify(&self, n_rows: usize, ids: Option<&[String]>) -> Result<(), AppError> {
        let mut owner = vec![0u8; n_rows];
        for (tag, rows) in [(1u8, &self.train), (2, &self.val), (3, &self.test)] {
            for &r in rows {
                if r >= n_rows {
                    return Err(AppError::config(format!(
                        "Partition row index {r} out of range (n={n_rows})."
                    )));
                }
                if owner[r] != 0 {
                    return Err(AppError::config(format!(
                        "Row {r} assigned to more than one partition."
                    )));
                }
                owner[r] = tag;
            }
        }

        if let (Some(groups), Some(ids)) = (&self.groups, ids) {
            let sets = [
                groups.train.iter().collect::<HashSet<_>>(),
                groups.val.iter().collect::<HashSet<_>>(),
                groups.test.iter().collect::<HashSet<_>>(),
            ];
            for (a, b) in [(0, 1), (0, 2), (1, 2)] {
                if let Some(id) = sets[a].intersection(&sets[b]).next() {
                    return Err(AppError::config(format!(
                        "Account `{id}` appears in more than one partition."
                    )));
                }
            }
            for (set, rows) in sets.iter().zip([&self.train, &self.val, &self.test]) {
                if let Some(&r) = rows.iter().find(|&&r| !set.contains(&ids[r])) {
                    return Err(AppError::config(format!(
                        "Row {r} (account `{}`) is outside its partition's account set.",
                        ids[r]
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Materialized split: frames and aligned targets.
#[derive(Debug, Clone)]
pub struct SplitData {
    pub x_train: Frame,
    pub x_val: Frame,
    pub x_test: Frame,
    pub y_train: Vec<f64>,
    pub y_val: Vec<f64>,
    pub y_test: Vec<f64>,
    pub partition: Partition,
    pub description: String,
}

/// Run the configured strategy, verify, and materialize the partitions.
pub fn split(frame: &Frame, target: &[f64], split: &SplitConfig, data: &DataConfig) -> Result<SplitData, AppError> {
    let partition = split_rows(frame, target, split, data)?;
    let ids = match split.strategy {
        SplitStrategy::GroupedByAccount => Some(id_keys(frame, &data.id_column)?),
        _ => None,
    };
    partition.verify(frame.n_rows(), ids.as_deref())?;

    let take = |rows: &[usize]| -> Vec<f64> { rows.iter().map(|&i| target[i]).collect() };
    let description = describe(split, &partition);

    Ok(SplitData {
        x_train: frame.take(&partition.train),
        x_val: frame.take(&partition.val),
        x_test: frame.take(&partition.test),
        y_train: take(&partition.train),
        y_val: take(&partition.val),
        y_test: take(&partition.test),
        partition,
        description,
    })
}

/// Compute the row partition for the configured strategy (unverified).
pub fn split_rows(
    frame: &Frame,
    target: &[f64],
    split: &SplitConfig,
    data: &DataConfig,
) -> Result<Partition, AppError> {
    let n = frame.n_rows();
    if target.len() != n {
        return Err(AppError::data(format!(
            "Target has {} values but the frame has {n} rows.",
            target.len()
        )));
    }
    if n == 0 {
        return Err(AppError::data("Cannot split an empty table."));
    }

    let mut rng = StdRng::seed_from_u64(split.seed);
    let all: Vec<usize> = (0..n).collect();
    let shares = Shares::from_config(split);

    let partition = match split.strategy {
        SplitStrategy::Random => random_three_way(&all, shares, &mut rng),
        SplitStrategy::Stratified => {
            let buckets = stratify_buckets(target, &split.stratify_edges);
            stratified_three_way(&all, &buckets, shares, &mut rng)
        }
        SplitStrategy::YearHoldout => year_holdout(frame, target, split, data, &mut rng)?,
        SplitStrategy::GroupedByAccount => grouped_by_account(frame, split, data, shares, &mut rng)?,
    };

    Ok(partition.sorted())
}

/// Fixed-edge target bucket per row; `NaN` gets its own bucket after the edges.
///
/// With edges `[1, 2]` the buckets are `<1`, `[1, 2)`, `>=2`, and missing.
pub fn stratify_buckets(target: &[f64], edges: &[f64]) -> Vec<usize> {
    target
        .iter()
        .map(|&t| {
            if t.is_nan() {
                edges.len() + 1
            } else {
                edges.iter().take_while(|&&e| t >= e).count()
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct Shares {
    train: f64,
    val: f64,
    test: f64,
}

impl Shares {
    fn from_config(split: &SplitConfig) -> Self {
        Self {
            train: split.train_ratio,
            val: split.val_ratio,
            test: split.test_ratio,
        }
    }
}

impl Partition {
    fn sorted(mut self) -> Self {
        self.train.sort_unstable();
        self.val.sort_unstable();
        self.test.sort_unstable();
        self
    }
}

fn cut(n: usize, ratio: f64) -> usize {
    ((n as f64) * ratio).floor() as usize
}

fn random_three_way(rows: &[usize], shares: Shares, rng: &mut StdRng) -> Partition {
    let mut perm = rows.to_vec();
    perm.shuffle(rng);

    let n = perm.len();
    let n_train = cut(n, shares.train).min(n);
    let n_val = if shares.test > 0.0 {
        cut(n, shares.val).min(n - n_train)
    } else {
        n - n_train
    };

    let test = perm.split_off(n_train + n_val);
    let val = perm.split_off(n_train);
    Partition {
        train: perm,
        val,
        test,
        groups: None,
    }
}

/// Move `round(len * frac)` rows of every bucket into the second output.
fn stratified_carve(rows: &[usize], buckets: &[usize], frac: f64, rng: &mut StdRng) -> (Vec<usize>, Vec<usize>) {
    let mut by_bucket: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &r in rows {
        by_bucket.entry(buckets[r]).or_default().push(r);
    }

    let mut keep = Vec::new();
    let mut carved = Vec::new();
    for (_, mut members) in by_bucket {
        members.shuffle(rng);
        let k = ((members.len() as f64) * frac).round() as usize;
        let k = k.min(members.len());
        carved.extend_from_slice(&members[..k]);
        keep.extend_from_slice(&members[k..]);
    }
    (keep, carved)
}

fn stratified_three_way(rows: &[usize], buckets: &[usize], shares: Shares, rng: &mut StdRng) -> Partition {
    let holdout = shares.val + shares.test;
    let (train, rest) = stratified_carve(rows, buckets, holdout, rng);

    if shares.test <= 0.0 {
        return Partition {
            train,
            val: rest,
            test: Vec::new(),
            groups: None,
        };
    }

    let test_share = shares.test / holdout;
    let (val, test) = stratified_carve(&rest, buckets, test_share, rng);
    Partition {
        train,
        val,
        test,
        groups: None,
    }
}

fn year_holdout(
    frame: &Frame,
    target: &[f64],
    split: &SplitConfig,
    data: &DataConfig,
    rng: &mut StdRng,
) -> Result<Partition, AppError> {
    let test_year = split
        .test_year
        .ok_or_else(|| AppError::config("`year-holdout` split requires split.test_year."))?;
    let years = frame.numeric(&data.year_column)?;

    let (test, rest): (Vec<usize>, Vec<usize>) =
        (0..frame.n_rows()).partition(|&i| years[i] == test_year as f64);
    if test.is_empty() {
        return Err(AppError::config(format!(
            "No rows with {}={test_year}; the year-holdout test partition would be empty.",
            data.year_column
        )));
    }

    let val_share = split.val_ratio / (split.train_ratio + split.val_ratio);
    let (train, val) = if split.stratify {
        let buckets = stratify_buckets(target, &split.stratify_edges);
        stratified_carve(&rest, &buckets, val_share, rng)
    } else {
        let mut perm = rest;
        perm.shuffle(rng);
        let n_train = cut(perm.len(), 1.0 - val_share);
        let val = perm.split_off(n_train);
        (perm, val)
    };

    Ok(Partition {
        train,
        val,
        test,
        groups: None,
    })
}

fn grouped_by_account(
    frame: &Frame,
    split: &SplitConfig,
    data: &DataConfig,
    shares: Shares,
    rng: &mut StdRng,
) -> Result<Partition, AppError> {
    let ids = id_keys(frame, &data.id_column)?;
    let allowed: Option<HashSet<&str>> = split
        .allowed_ids
        .as_ref()
        .map(|list| list.iter().map(String::as_str).collect());

    // Unique identifiers in order of first appearance, restricted to the allow-list.
    let mut seen = HashSet::new();
    let mut unique: Vec<String> = Vec::new();
    for id in &ids {
        let ok = allowed.as_ref().is_none_or(|set| set.contains(id.as_str()));
        if ok && seen.insert(id.as_str()) {
            unique.push(id.clone());
        }
    }
    if unique.is_empty() {
        return Err(AppError::data("No account identifiers remain after the allow-list."));
    }

    unique.shuffle(rng);
    let n = unique.len();
    let n_train = cut(n, shares.train).min(n);
    let n_val = if shares.test > 0.0 {
        cut(n, shares.val).min(n - n_train)
    } else {
        n - n_train
    };
    let test_ids = unique.split_off(n_train + n_val);
    let val_ids = unique.split_off(n_train);
    let train_ids = unique;

    let mut owner: HashMap<&str, u8> = HashMap::new();
    for (tag, set) in [(0u8, &train_ids), (1, &val_ids), (2, &test_ids)] {
        for id in set.iter() {
            owner.insert(id.as_str(), tag);
        }
    }

    let mut train = Vec::new();
    let mut val = Vec::new();
    let mut test = Vec::new();
    for (row, id) in ids.iter().enumerate() {
        match owner.get(id.as_str()) {
            Some(0) => train.push(row),
            Some(1) => val.push(row),
            Some(_) => test.push(row),
            None => {} // not on the allow-list
        }
    }

    Ok(Partition {
        train,
        val,
        test,
        groups: Some(GroupSets {
            train: train_ids,
            val: val_ids,
            test: test_ids,
        }),
    })
}

fn id_keys(frame: &Frame, id_column: &str) -> Result<Vec<String>, AppError> {
    let col = frame.column(id_column).ok_or_else(|| {
        AppError::config(format!(
            "Grouped split requires the id column `{id_column}`; available columns are [{}]",
            frame.names().join(", ")
        ))
    })?;
    Ok((0..col.len()).map(|i| col.key_at(i)).collect())
}

fn describe(split: &SplitConfig, p: &Partition) -> String {
    let mut out = format!(
        "{} split (seed={}): train={} val={} test={}",
        split.strategy.display_name(),
        split.seed,
        p.train.len(),
        p.val.len(),
        p.test.len()
    );
    if let Some(year) = split.test_year.filter(|_| split.strategy == SplitStrategy::YearHoldout) {
        out.push_str(&format!(", test_year={year}"));
    }
    if let Some(groups) = &p.groups {
        out.push_str(&format!(
            ", accounts train={} val={} test={}",
            groups.train.len(),
            groups.val.len(),
            groups.test.len()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Column;
    use proptest::prelude::*;

    fn frame_with(ids: Vec<String>, years: Vec<f64>) -> Frame {
        let mut f = Frame::new();
        f.push_column("ACCOUNT_ID", Column::Categorical(ids.into_iter().map(Some).collect()))
            .unwrap();
        f.push_column("YEAR", Column::Numeric(years)).unwrap();
        f
    }

    fn simple_frame(n: usize) -> Frame {
        frame_with(
            (0..n).map(|i| format!("A{}", i / 3)).collect(),
            (0..n).map(|i| 2019.0 + (i % 4) as f64).collect(),
        )
    }

    fn config(strategy: SplitStrategy) -> SplitConfig {
        SplitConfig {
            strategy,
            ..SplitConfig::default()
        }
    }

    #[test]
    fn random_split_cuts_with_floor_and_test_takes_remainder() {
        let f = simple_frame(101);
        let target = vec![0.0; 101];
        let p = split_rows(&f, &target, &config(SplitStrategy::Random), &DataConfig::default()).unwrap();
        // floor(101 * 0.7) = 70, floor(101 * 0.15) = 15, remainder 16.
        assert_eq!((p.train.len(), p.val.len(), p.test.len()), (70, 15, 16));
        p.verify(101, None).unwrap();
    }

    #[test]
    fn two_way_split_when_test_ratio_is_zero() {
        let f = simple_frame(50);
        let target = vec![0.0; 50];
        let mut cfg = config(SplitStrategy::Random);
        cfg.train_ratio = 0.8;
        cfg.val_ratio = 0.2;
        cfg.test_ratio = 0.0;
        let p = split_rows(&f, &target, &cfg, &DataConfig::default()).unwrap();
        assert_eq!((p.train.len(), p.val.len(), p.test.len()), (40, 10, 0));
    }

    #[test]
    fn same_seed_same_partition() {
        let f = simple_frame(200);
        let target: Vec<f64> = (0..200).map(|i| (i % 3) as f64).collect();
        for strategy in [
            SplitStrategy::Random,
            SplitStrategy::Stratified,
            SplitStrategy::GroupedByAccount,
        ] {
            let cfg = config(strategy);
            let a = split_rows(&f, &target, &cfg, &DataConfig::default()).unwrap();
            let b = split_rows(&f, &target, &cfg, &DataConfig::default()).unwrap();
            assert_eq!(a, b, "{strategy:?}");
        }
    }

    #[test]
    fn different_seed_changes_partition() {
        let f = simple_frame(200);
        let target = vec![0.0; 200];
        let a = split_rows(&f, &target, &config(SplitStrategy::Random), &DataConfig::default()).unwrap();
        let mut cfg = config(SplitStrategy::Random);
        cfg.seed = 7;
        let b = split_rows(&f, &target, &cfg, &DataConfig::default()).unwrap();
        assert_ne!(a.train, b.train);
    }

    #[test]
    fn buckets_use_fixed_edges_and_missing_bucket() {
        let b = stratify_buckets(&[0.0, 1.0, 2.0, 5.0, f64::NAN, 0.5], &[1.0, 2.0]);
        assert_eq!(b, vec![0, 1, 2, 2, 3, 0]);
    }

    #[test]
    fn stratified_split_preserves_bucket_shares() {
        let n = 1000;
        let f = simple_frame(n);
        // 70% zero, 20% one, 10% two-plus.
        let target: Vec<f64> = (0..n)
            .map(|i| match i % 10 {
                0..=6 => 0.0,
                7 | 8 => 1.0,
                _ => 3.0,
            })
            .collect();
        let p = split_rows(&f, &target, &config(SplitStrategy::Stratified), &DataConfig::default()).unwrap();
        p.verify(n, None).unwrap();
        assert_eq!(p.n_rows(), n);

        let buckets = stratify_buckets(&target, &[1.0, 2.0]);
        for part in [&p.train, &p.val, &p.test] {
            for (bucket, expected) in [(0usize, 0.7), (1, 0.2), (2, 0.1)] {
                let share = part.iter().filter(|&&r| buckets[r] == bucket).count() as f64 / part.len() as f64;
                assert!((share - expected).abs() < 0.02, "bucket {bucket}: {share} vs {expected}");
            }
        }
    }

    #[test]
    fn year_holdout_puts_the_year_in_test() {
        let f = simple_frame(120);
        let target = vec![0.0; 120];
        let mut cfg = config(SplitStrategy::YearHoldout);
        cfg.test_year = Some(2022);
        let p = split_rows(&f, &target, &cfg, &DataConfig::default()).unwrap();
        let years = f.numeric("YEAR").unwrap();
        assert_eq!(p.test.len(), 30);
        assert!(p.test.iter().all(|&r| years[r] == 2022.0));
        assert!(p.train.iter().chain(p.val.iter()).all(|&r| years[r] != 2022.0));
        assert_eq!(p.n_rows(), 120);
    }

    #[test]
    fn stratified_year_holdout_keeps_bucket_shares_outside_the_year() {
        let n = 1200;
        let f = simple_frame(n);
        let target: Vec<f64> = (0..n)
            .map(|i| match i % 10 {
                0..=6 => 0.0,
                7 | 8 => 1.0,
                _ => 3.0,
            })
            .collect();
        let mut cfg = config(SplitStrategy::YearHoldout);
        cfg.test_year = Some(2022);
        assert!(cfg.stratify);
        let p = split_rows(&f, &target, &cfg, &DataConfig::default()).unwrap();
        p.verify(n, None).unwrap();

        let buckets = stratify_buckets(&target, &cfg.stratify_edges);
        let share = |rows: &[usize], bucket: usize| {
            rows.iter().filter(|&&r| buckets[r] == bucket).count() as f64 / rows.len() as f64
        };
        let rest: Vec<usize> = p.train.iter().chain(p.val.iter()).copied().collect();
        for bucket in 0..3 {
            let expected = share(&rest, bucket);
            for part in [&p.train, &p.val] {
                let got = share(part, bucket);
                assert!((got - expected).abs() < 0.02, "bucket {bucket}: {got} vs {expected}");
            }
        }
    }

    #[test]
    fn year_holdout_without_rows_for_year_is_config_error() {
        let f = simple_frame(12);
        let mut cfg = config(SplitStrategy::YearHoldout);
        cfg.test_year = Some(1990);
        let err = split_rows(&f, &[0.0; 12], &cfg, &DataConfig::default()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn grouped_split_respects_allow_list() {
        let f = simple_frame(30); // accounts A0..A9, three rows each
        let mut cfg = config(SplitStrategy::GroupedByAccount);
        cfg.allowed_ids = Some((0..5).map(|i| format!("A{i}")).collect());
        let data = split(&f, &[0.0; 30], &cfg, &DataConfig::default()).unwrap();
        assert_eq!(data.partition.n_rows(), 15);
        let groups = data.partition.groups.as_ref().unwrap();
        assert_eq!(groups.train.len() + groups.val.len() + groups.test.len(), 5);
    }

    #[test]
    fn verify_rejects_overlapping_account_sets() {
        let f = simple_frame(6);
        let ids = id_keys(&f, "ACCOUNT_ID").unwrap();
        let p = Partition {
            train: vec![0, 1, 2],
            val: vec![3, 4, 5],
            test: Vec::new(),
            groups: Some(GroupSets {
                train: vec!["A0".into(), "A1".into()],
                val: vec!["A1".into()],
                test: Vec::new(),
            }),
        };
        let err = p.verify(6, Some(&ids)).unwrap_err();
        assert!(err.to_string().contains("more than one partition"));
    }

    #[test]
    fn materialized_targets_align_with_rows() {
        let f = simple_frame(40);
        let target: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let data = split(&f, &target, &config(SplitStrategy::Random), &DataConfig::default()).unwrap();
        assert_eq!(data.y_train, data.partition.train.iter().map(|&i| i as f64).collect::<Vec<_>>());
        assert_eq!(data.x_test.n_rows(), data.y_test.len());
    }

    proptest! {
        #[test]
        fn grouped_splits_never_share_accounts(
            rows in 3usize..200,
            accounts in 1usize..40,
            seed in any::<u64>(),
        ) {
            let ids: Vec<String> = (0..rows).map(|i| format!("ACC{}", (i * 7) % accounts)).collect();
            let f = frame_with(ids.clone(), vec![2020.0; rows]);
            let mut cfg = config(SplitStrategy::GroupedByAccount);
            cfg.seed = seed;
            let data = split(&f, &vec![0.0; rows], &cfg, &DataConfig::default()).unwrap();
            let p = &data.partition;
            let g = p.groups.as_ref().unwrap();

            let train: HashSet<_> = g.train.iter().collect();
            let val: HashSet<_> = g.val.iter().collect();
            let test: HashSet<_> = g.test.iter().collect();
            prop_assert!(train.is_disjoint(&val));
            prop_assert!(train.is_disjoint(&test));
            prop_assert!(val.is_disjoint(&test));

            prop_assert!(p.train.iter().all(|&r| train.contains(&ids[r])));
            prop_assert!(p.val.iter().all(|&r| val.contains(&ids[r])));
            prop_assert!(p.test.iter().all(|&r| test.contains(&ids[r])));
            prop_assert_eq!(p.n_rows(), rows);
        }

        #[test]
        fn partitions_cover_input_exactly_once(rows in 1usize..300, seed in any::<u64>()) {
            let f = simple_frame(rows);
            let target: Vec<f64> = (0..rows).map(|i| (i % 4) as f64).collect();
            for strategy in [SplitStrategy::Random, SplitStrategy::Stratified] {
                let mut cfg = config(strategy);
                cfg.seed = seed;
                let p = split_rows(&f, &target, &cfg, &DataConfig::default()).unwrap();
                prop_assert!(p.verify(rows, None).is_ok());
                prop_assert_eq!(p.n_rows(), rows);
            }
        }
    }
}
