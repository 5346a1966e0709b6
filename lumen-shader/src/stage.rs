use enumflags2::BitFlags;

/// Programmable pipeline stage a shader node compiles to.
#[enumflags2::bitflags]
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex = 1 << 0,
    TessellationControl = 1 << 1,
    TessellationEvaluation = 1 << 2,
    Geometry = 1 << 3,
    Fragment = 1 << 4,
    Compute = 1 << 5,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 6] = [
        ShaderStage::Vertex,
        ShaderStage::TessellationControl,
        ShaderStage::TessellationEvaluation,
        ShaderStage::Geometry,
        ShaderStage::Fragment,
        ShaderStage::Compute,
    ];

    /// Resolve a top-level node name such as `VertexShader` to its stage.
    ///
    /// Matching is by prefix, so `FragmentShader` and `FragmentMain` both map to
    /// [`ShaderStage::Fragment`].
    pub fn from_name(name: &str) -> Option<ShaderStage> {
        Self::ALL.into_iter().find(|stage| name.starts_with(stage.prefix()))
    }

    pub fn prefix(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "Vertex",
            ShaderStage::TessellationControl => "TessellationControl",
            ShaderStage::TessellationEvaluation => "TessellationEvaluation",
            ShaderStage::Geometry => "Geometry",
            ShaderStage::Fragment => "Fragment",
            ShaderStage::Compute => "Compute",
        }
    }

    /// Stage name as understood by `glslangValidator -S`.
    pub fn glslang_stage(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vert",
            ShaderStage::TessellationControl => "tesc",
            ShaderStage::TessellationEvaluation => "tese",
            ShaderStage::Geometry => "geom",
            ShaderStage::Fragment => "frag",
            ShaderStage::Compute => "comp",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShaderStages(BitFlags<ShaderStage>);

impl ShaderStages {
    pub fn empty() -> Self {
        Self(BitFlags::empty())
    }

    pub fn insert(&mut self, stage: ShaderStage) {
        self.0.insert(stage);
    }

    pub fn contains(self, stage: ShaderStage) -> bool {
        self.0.contains(stage)
    }

    pub fn is_empty(self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(self) -> impl Iterator<Item = ShaderStage> {
        self.0.iter()
    }
}

impl From<ShaderStage> for ShaderStages {
    fn from(value: ShaderStage) -> Self {
        Self(BitFlags::from_flag(value))
    }
}

impl core::ops::BitOr for ShaderStages {
    type Output = ShaderStages;
    fn bitor(self, rhs: ShaderStages) -> Self::Output {
        ShaderStages(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for ShaderStages {
    fn bitor_assign(&mut self, rhs: ShaderStages) {
        self.0 |= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("VertexShader", Some(ShaderStage::Vertex))]
    #[case("FragmentShader", Some(ShaderStage::Fragment))]
    #[case("TessellationControlShader", Some(ShaderStage::TessellationControl))]
    #[case("TessellationEvaluation", Some(ShaderStage::TessellationEvaluation))]
    #[case("GeometryPass", Some(ShaderStage::Geometry))]
    #[case("Compute", Some(ShaderStage::Compute))]
    #[case("Pixel", None)]
    #[case("vertexShader", None)]
    fn stage_from_node_name(#[case] name: &str, #[case] expected: Option<ShaderStage>) {
        assert_eq!(ShaderStage::from_name(name), expected);
    }

    #[test]
    fn stages_combine() {
        let mut stages = ShaderStages::from(ShaderStage::Vertex);
        stages |= ShaderStage::Fragment.into();

        assert!(stages.contains(ShaderStage::Vertex));
        assert!(stages.contains(ShaderStage::Fragment));
        assert!(!stages.contains(ShaderStage::Compute));
        assert_eq!(stages.iter().collect::<Vec<_>>(), [ShaderStage::Vertex, ShaderStage::Fragment]);
        assert!(ShaderStages::empty().is_empty());
    }
}
