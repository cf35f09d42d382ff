use super::types::{ProjectionPath, ProjectionResult};

/// Reduces simulated paths to per-month percentile bands.
///
/// Percentiles are picked by index (`sorted[floor(n * p)]`), never
/// interpolated. Ragged input is cut to the shortest path.
pub fn analyze(paths: &[ProjectionPath]) -> ProjectionResult {
    let steps = paths.iter().map(Vec::len).min().unwrap_or(0);
    if steps == 0 {
        return ProjectionResult::default();
    }

    let n = paths.len();
    let mut median_path = Vec::with_capacity(steps);
    let mut p10_path = Vec::with_capacity(steps);
    let mut p90_path = Vec::with_capacity(steps);
    let mut column = Vec::with_capacity(n);

    for t in 0..steps {
        column.clear();
        column.extend(paths.iter().map(|path| path[t]));
        column.sort_by(|a, b| a.total_cmp(b));

        p10_path.push(column[percentile_index(n, 0.1)]);
        median_path.push(column[percentile_index(n, 0.5)]);
        p90_path.push(column[percentile_index(n, 0.9)]);
    }

    let final_outcomes = paths.iter().map(|path| path[steps - 1]).collect();

    ProjectionResult {
        median_path,
        p10_path,
        p90_path,
        final_outcomes,
    }
}

fn percentile_index(n: usize, p: f64) -> usize {
    ((n as f64 * p).floor() as usize).min(n - 1)
}
