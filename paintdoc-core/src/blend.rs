/// How a layer combines with what's beneath it.
///
/// The serialized names are OpenRaster `composite-op` strings.
#[derive(
    strum::AsRefStr,
    strum::IntoStaticStr,
    strum::EnumString,
    strum::EnumIter,
    PartialEq,
    Eq,
    Copy,
    Clone,
    Hash,
    Debug,
    Default,
)]
#[repr(u8)]
pub enum BlendMode {
    #[default]
    #[strum(serialize = "svg:src-over")]
    Normal,
    #[strum(serialize = "svg:plus")]
    Add,
    #[strum(serialize = "svg:multiply")]
    Multiply,
    #[strum(serialize = "svg:screen")]
    Screen,
    #[strum(serialize = "svg:overlay")]
    Overlay,
    #[strum(serialize = "svg:darken")]
    Darken,
    #[strum(serialize = "svg:lighten")]
    Lighten,
    /// Groups only - children blend directly into the backdrop as if ungrouped.
    #[strum(serialize = "svg:pass-through")]
    PassThrough,
}
impl BlendMode {
    /// The composite-op string used by the container format.
    #[must_use]
    pub fn composite_op(self) -> &'static str {
        self.into()
    }
    /// Parse a composite-op, falling back to `Normal` for unknown ops written by other programs.
    #[must_use]
    pub fn from_composite_op(op: &str) -> Self {
        op.parse().unwrap_or_else(|_| {
            log::warn!("unknown composite-op {op:?}, using normal");
            Self::Normal
        })
    }
}

#[cfg(test)]
mod test {
    use super::BlendMode;
    #[test]
    fn composite_op_names_agree() {
        use strum::IntoEnumIterator;
        for mode in BlendMode::iter() {
            assert_eq!(mode.composite_op(), mode.as_ref());
            assert_eq!(BlendMode::from_composite_op(mode.composite_op()), mode);
        }
        assert_eq!(BlendMode::from_composite_op("svg:hue"), BlendMode::Normal);
    }
}
