/// Arithmetic mean of every sample, None when there are none
pub fn calculate_mean(prices: &[f64]) -> Option<f64> {
    if prices.is_empty() {
        return None;
    }

    let sum: f64 = prices.iter().sum();
    Some(sum / prices.len() as f64)
}

/// Calculate Simple Moving Average (SMA) over the most recent `period` samples
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    calculate_mean(&prices[prices.len() - period..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0];
        assert_eq!(calculate_mean(&prices), Some(104.0));
    }

    #[test]
    fn test_mean_empty() {
        assert!(calculate_mean(&[]).is_none());
    }

    #[test]
    fn test_sma_uses_latest_window() {
        let prices = vec![1.0, 100.0, 102.0, 104.0];
        assert_eq!(calculate_sma(&prices, 3), Some(102.0));
    }

    #[test]
    fn test_sma_insufficient_data() {
        let prices = vec![100.0, 102.0];
        assert!(calculate_sma(&prices, 5).is_none());
        assert!(calculate_sma(&prices, 0).is_none());
    }
}
