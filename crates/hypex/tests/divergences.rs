//! Divergences computed from dump files on disk.

use dbacl_category::{write_dump, CategoryHeader, DumpRecord};
use dbacl_hypex::{CategoryPair, SweepConfig, SAFETY_TOLERANCE};
use std::path::{Path, PathBuf};

/// `(id, lambda, reference)` records with a matching normalization constant.
fn write_model(dir: &Path, name: &str, records: &[(u64, f64, f64)]) -> PathBuf {
    let logz = (1.0
        + records
            .iter()
            .map(|&(_, lam, reference)| (lam.exp() - 1.0) * reference.exp())
            .sum::<f64>())
    .ln();
    let header = CategoryHeader {
        logz,
        max_order: 1,
        ..CategoryHeader::default()
    };
    let records: Vec<DumpRecord> = records
        .iter()
        .map(|&(id, lam, reference)| DumpRecord {
            lam,
            reference,
            count: 3,
            id,
            token: Some(format!("t{}", id)),
        })
        .collect();

    let path = dir.join(name);
    let mut buf = Vec::new();
    write_dump(&mut buf, &header, &records).unwrap();
    std::fs::write(&path, buf).unwrap();
    path
}

fn quarter() -> f64 {
    0.25f64.ln()
}

#[test]
fn test_divergence_of_model_with_itself_is_zero() {
    let dir = tempfile::tempdir().unwrap();
    let records = [(11, 0.8, quarter()), (12, -0.3, quarter()), (13, 1.5, -3.0)];
    let p = write_model(dir.path(), "p", &records);
    let q = write_model(dir.path(), "q", &records);

    let pair = CategoryPair::from_files(&p, &q).unwrap();
    let edges = pair.edge_divergences().unwrap();
    assert!(edges.d01.abs() < 1e-12);
    assert!(edges.d10.abs() < 1e-12);
    assert!(edges.safety.iter().all(|s| s.abs() < SAFETY_TOLERANCE));

    let sweep = pair.chernoff_sweep(SweepConfig::default()).unwrap();
    assert!(sweep.chernoff_rate.abs() < 1e-12);
    for point in &sweep.points {
        assert!(point.divergence[0].abs() < 1e-12);
        assert!(point.divergence[1].abs() < 1e-12);
    }
}

#[test]
fn test_mirrored_models_cross_halfway() {
    let dir = tempfile::tempdir().unwrap();
    let p0 = write_model(dir.path(), "p0", &[(21, 1.0, quarter()), (22, -1.0, quarter())]);
    let p1 = write_model(dir.path(), "p1", &[(21, -1.0, quarter()), (22, 1.0, quarter())]);

    let pair = CategoryPair::from_files(&p0, &p1).unwrap();
    let edges = pair.edge_divergences().unwrap();
    assert!(edges.d01 > 0.0);
    assert!((edges.d01 - edges.d10).abs() < 1e-9);

    let sweep = pair.chernoff_sweep(SweepConfig::default()).unwrap();
    assert_eq!(sweep.points.len(), 11);
    assert_eq!(sweep.points.last().unwrap().beta, 1.0);
    assert!((sweep.chernoff_beta - 0.5).abs() <= 0.05 + 1e-9);
    assert!(sweep.chernoff_rate > 0.0);
    assert!(sweep.chernoff_rate < edges.d01);

    // the ends of the sweep are the categories themselves
    let first = sweep.points[0];
    assert!((first.divergence[0] - edges.d10).abs() < 1e-9);
    assert!(first.divergence[1].abs() < 1e-9);
}

#[test]
fn test_missing_dump_file() {
    let dir = tempfile::tempdir().unwrap();
    let p0 = write_model(dir.path(), "p0", &[(1, 0.5, quarter())]);
    assert!(CategoryPair::from_files(&p0, &dir.path().join("nope")).is_err());
}
