pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Population standard deviation
pub fn std_dev(data: &[f64]) -> Option<f64> {
    let data_mean = mean(data)?;
    let variance = data
        .iter()
        .map(|value| {
            let diff = data_mean - *value;

            diff * diff
        })
        .sum::<f64>()
        / data.len() as f64;

    Some(variance.sqrt())
}

/// Round to a fixed number of decimal places, the way results are reported
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}
