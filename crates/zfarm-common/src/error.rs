use thiserror::Error;

#[derive(Error, Debug)]
pub enum FarmError {
    /// Fewer than write-quorum clusters acknowledged a write. Carries every
    /// per-cluster error message observed before the write was abandoned.
    #[error("no quorum ({})", .0.join("; "))]
    NoQuorum(Vec<String>),

    /// Every cluster consulted by a read failed.
    #[error("all clusters failed ({})", .0.join("; "))]
    AllClustersFailed(Vec<String>),

    /// Opaque pass-through for whatever a cluster implementation raised.
    #[error("cluster error: {0}")]
    Cluster(String),

    /// The farm was constructed with an unsatisfiable write quorum.
    #[error("invalid write quorum {quorum} for {clusters} clusters")]
    InvalidQuorum { quorum: usize, clusters: usize },
}

pub type Result<T> = std::result::Result<T, FarmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_quorum_aggregates_messages() {
        let err = FarmError::NoQuorum(vec!["c1 down".to_string(), "c2 down".to_string()]);
        assert_eq!(err.to_string(), "no quorum (c1 down; c2 down)");
    }

    #[test]
    fn test_no_quorum_with_no_observed_errors() {
        // Possible when quorum exceeds replies without any cluster erroring.
        let err = FarmError::NoQuorum(vec![]);
        assert_eq!(err.to_string(), "no quorum ()");
    }

    #[test]
    fn test_invalid_quorum_display() {
        let err = FarmError::InvalidQuorum {
            quorum: 4,
            clusters: 3,
        };
        assert_eq!(err.to_string(), "invalid write quorum 4 for 3 clusters");
    }
}
