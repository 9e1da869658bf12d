/// Taps on each side of the centre texel.
pub const BLUR_RADIUS: usize = 4;

/// One-sided 9-tap Gaussian weights, centre first. Shared by the software
/// blur and the generated GLSL so both backends use identical weights.
pub const BLUR_WEIGHTS: [f32; BLUR_RADIUS + 1] =
    [0.227027, 0.1945946, 0.1216216, 0.054054, 0.016216];

/// Weight for a signed tap offset, zero outside the kernel.
pub fn weight(offset: i32) -> f32 {
    BLUR_WEIGHTS
        .get(offset.unsigned_abs() as usize)
        .copied()
        .unwrap_or(0.0)
}

/// GLSL array literal for [`BLUR_WEIGHTS`].
pub(crate) fn glsl_weights() -> String {
    let values: Vec<String> = BLUR_WEIGHTS.iter().map(|w| format!("{w:.7}")).collect();
    format!(
        "const float BLUR_WEIGHTS[{}] = float[]({});",
        BLUR_WEIGHTS.len(),
        values.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_is_normalised() {
        let total: f32 = (-(BLUR_RADIUS as i32)..=BLUR_RADIUS as i32)
            .map(weight)
            .sum();
        assert!((total - 1.0).abs() < 1e-5, "sum was {total}");
        assert_eq!(weight(5), 0.0);
        assert_eq!(weight(-3), weight(3));
    }

    #[test]
    fn glsl_literal_lists_every_weight() {
        let literal = glsl_weights();
        assert!(literal.starts_with("const float BLUR_WEIGHTS[5]"));
        assert!(literal.contains("0.2270270"));
        assert!(literal.contains("0.0162160"));
    }
}
