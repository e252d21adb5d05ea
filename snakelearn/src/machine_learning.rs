// machine_learning.rs
pub mod nn;
pub mod reinforcement_learning;

/// Index of the largest value, first one wins on ties. `None` for an empty slice or when every
/// value is NaN.
pub fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, best_v)) if best_v >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

pub fn one_hot(indices: &[usize], size: usize) -> Vec<f32> {
    let mut encoded = vec![0.0; indices.len() * size];
    for (row, &index) in indices.iter().enumerate() {
        encoded[row * size + index] = 1.0;
    }
    encoded
}
