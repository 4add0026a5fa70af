/// Compute the squared Euclidean distance between two vectors.
///
/// Uses f64 intermediate precision. Callers must check dimensions first;
/// extra components of the longer slice are ignored.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    let mut sum: f64 = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        let d = *x as f64 - *y as f64;
        sum += d * d;
    }
    sum as f32
}

/// Map a squared Euclidean distance to a similarity score.
///
/// For unit vectors `‖a−b‖² = 2 − 2·cos(a,b)`, so `1 − d²/4` lies in
/// `[0, 1]` and equals 1 for identical vectors. Inputs that are not
/// unit-normalized produce scores outside that range.
pub fn similarity(squared_distance: f32) -> f32 {
    1.0 - squared_distance / 4.0
}

/// Scale `v` in place to unit L2 norm. Zero vectors are left unchanged.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f64 = v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt();
    if norm > 0.0 {
        let s = (1.0 / norm) as f32;
        for x in v.iter_mut() {
            *x *= s;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical() {
        assert_eq!(squared_l2(&[0.6, 0.8, 0.0], &[0.6, 0.8, 0.0]), 0.0);
        assert_eq!(similarity(0.0), 1.0);
    }

    #[test]
    fn test_orthogonal_unit() {
        let d = squared_l2(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!((d - 2.0).abs() < 1e-6, "orthogonal: got {d}");
        assert!((similarity(d) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_opposite_unit() {
        let d = squared_l2(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((d - 4.0).abs() < 1e-6, "opposite: got {d}");
        assert_eq!(similarity(d), 0.0);
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut z = vec![0.0, 0.0];
        l2_normalize(&mut z);
        assert_eq!(z, vec![0.0, 0.0]);
    }
}
