//! # Brush
//!
//! The brush engine itself lives outside of the document. The document only needs to know which
//! setting changed, to decide whether an in-progress stroke should become its own undo step.

/// Brush engine settings, by their canonical names.
#[derive(
    strum::AsRefStr,
    strum::EnumString,
    strum::EnumIter,
    PartialEq,
    Eq,
    Copy,
    Clone,
    Hash,
    Debug,
)]
#[strum(serialize_all = "snake_case")]
pub enum BrushSetting {
    Opaque,
    OpaqueMultiply,
    OpaqueLinearize,
    RadiusLogarithmic,
    Hardness,
    AntiAliasing,
    DabsPerBasicRadius,
    DabsPerActualRadius,
    DabsPerSecond,
    RadiusByRandom,
    Speed1Slowness,
    Speed2Slowness,
    Speed1Gamma,
    Speed2Gamma,
    OffsetByRandom,
    OffsetBySpeed,
    OffsetBySpeedSlowness,
    SlowTracking,
    SlowTrackingPerDab,
    TrackingNoise,
    ColorH,
    ColorS,
    ColorV,
    RestoreColor,
    ChangeColorH,
    ChangeColorL,
    ChangeColorHslS,
    ChangeColorV,
    ChangeColorHsvS,
    Smudge,
    SmudgeLength,
    SmudgeRadiusLog,
    Eraser,
    StrokeThreshold,
    StrokeDurationLogarithmic,
    StrokeHoldtime,
    CustomInput,
    CustomInputSlowness,
    EllipticalDabRatio,
    EllipticalDabAngle,
    DirectionFilter,
    LockAlpha,
    Colorize,
}
impl BrushSetting {
    /// Lightweight settings are expected to change often mid-stroke, e.g. by keyboard shortcut.
    /// Changing only these doesn't split the stroke into a new undo step.
    #[must_use]
    pub fn is_lightweight(self) -> bool {
        matches!(
            self,
            Self::RadiusLogarithmic
                | Self::ColorH
                | Self::ColorS
                | Self::ColorV
                | Self::Opaque
                | Self::Hardness
                | Self::SlowTracking
                | Self::SlowTrackingPerDab
        )
    }
}

#[cfg(test)]
mod test {
    use super::BrushSetting;
    #[test]
    fn names() {
        assert_eq!(BrushSetting::ColorH.as_ref(), "color_h");
        assert_eq!(
            "slow_tracking_per_dab".parse::<BrushSetting>(),
            Ok(BrushSetting::SlowTrackingPerDab)
        );
    }
    #[test]
    fn lightweight_set() {
        use strum::IntoEnumIterator;
        let light = BrushSetting::iter().filter(|s| s.is_lightweight()).count();
        assert_eq!(light, 8);
        assert!(!BrushSetting::Eraser.is_lightweight());
    }
}
