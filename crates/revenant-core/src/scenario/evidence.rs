/// Number of lines containing `marker` as a literal substring.
pub fn count_marker<S: AsRef<str>>(lines: &[S], marker: &str) -> usize {
    if marker.is_empty() {
        return 0;
    }
    lines.iter().filter(|l| l.as_ref().contains(marker)).count()
}

/// Marker counts gathered over a run. `None` means every log fetch for that
/// count failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvidenceSummary {
    /// Activity executions seen during the baseline (B).
    pub activity_before: Option<usize>,
    /// Anomaly lines seen before the outage.
    pub anomalies_before: Option<usize>,
    /// Activity executions logged since the outage began.
    pub activity_after: Option<usize>,
    /// Anomaly lines logged since the outage began (C).
    pub anomalies_after: Option<usize>,
}
