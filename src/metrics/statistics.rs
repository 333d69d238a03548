use crate::network::ParameterSet;

/// Statistics for a collection of values
#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    pub mean: f32,
    pub std: f32,
    pub min: f32,
    pub max: f32,
    pub count: usize,
}

impl Statistics {
    /// Compute statistics from a slice of values
    pub fn from_slice(values: &[f32]) -> Self {
        if values.is_empty() {
            return Statistics {
                mean: 0.0,
                std: 0.0,
                min: 0.0,
                max: 0.0,
                count: 0,
            };
        }

        let count = values.len();
        let sum: f32 = values.iter().sum();
        let mean = sum / count as f32;

        let variance = values.iter()
            .map(|&x| (x - mean).powi(2))
            .sum::<f32>() / count as f32;

        Statistics {
            mean,
            std: variance.sqrt(),
            min: values.iter().copied().fold(f32::INFINITY, f32::min),
            max: values.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            count,
        }
    }
}

/// L2 norm of every parameter tensor, keyed by name
pub fn parameter_norms(params: &ParameterSet) -> Vec<(String, f32)> {
    params
        .iter()
        .map(|(name, tensor)| (name.clone(), tensor.iter().map(|v| v * v).sum::<f32>().sqrt()))
        .collect()
}

/// Count NaN and infinite entries across a parameter set
pub fn count_non_finite(params: &ParameterSet) -> usize {
    params
        .values()
        .map(|tensor| tensor.iter().filter(|v| !v.is_finite()).count())
        .sum()
}
