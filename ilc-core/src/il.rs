//! Source-IL vocabulary: opcode numbers, operand field encodings and the
//! per-opcode arity table.
//!
//! The numeric values follow the IL token encoding. Opcodes the hardware
//! vendor never documented keep their observed slots (`Unk660` and the
//! typed-UAV declarations).

use num_derive::FromPrimitive;

/// One past the highest opcode value carried by the token encoding.
pub const OP_LAST: u16 = 661;

/// Instruction opcodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u16)]
pub enum Op {
    Abs = 1,
    Acos = 2,
    Add = 3,
    And = 4,
    Asin = 5,
    Atan = 6,
    Break = 7,
    Breakc = 8,
    BreakLogicalNz = 9,
    BreakLogicalZ = 10,
    Case = 11,
    CmovLogical = 12,
    Continue = 13,
    ContinueLogicalNz = 14,
    ContinueLogicalZ = 15,
    CosVec = 16,
    DclArray = 17,
    DclConstBuffer = 18,
    DclIndexedTempArray = 19,
    DclInput = 20,
    DclLiteral = 21,
    DclOutput = 22,
    DclResource = 23,
    Default = 24,
    DiscardLogicalNz = 25,
    DiscardLogicalZ = 26,
    Div = 27,
    Dp2 = 28,
    Dp3 = 29,
    Dp4 = 30,
    Dsx = 31,
    Dsy = 32,
    Else = 33,
    EndSwitch = 34,
    Eq = 35,
    ExpVec = 36,
    Fetch4 = 37,
    Frc = 38,
    Ftoi = 39,
    EndMain = 40,
    EndIf = 41,
    End = 42,
    EndLoop = 43,
    Ftou = 44,
    Ge = 45,
    IfLogicalNz = 46,
    IfLogicalZ = 47,
    Itof = 48,
    Load = 49,
    LogVec = 50,
    Lt = 51,
    Mad = 52,
    Max = 53,
    Min = 54,
    Mov = 55,
    Mul = 56,
    Ne = 57,
    ResInfo = 58,
    RetDyn = 59,
    RoundNear = 60,
    RoundNegInf = 61,
    RoundPlusInf = 62,
    RoundZero = 63,
    RsqVec = 64,
    Sample = 65,
    SampleB = 66,
    SampleCLz = 67,
    SampleG = 68,
    SampleL = 69,
    SinVec = 70,
    SqrtVec = 71,
    Switch = 72,
    Utof = 73,
    While = 74,

    IAdd = 128,
    IBitExtract = 129,
    IFirstBit = 130,
    IEq = 131,
    IGe = 132,
    ILt = 133,
    IMad = 134,
    IMax = 135,
    IMin = 136,
    IMul = 137,
    INe = 138,
    INegate = 139,
    INot = 140,
    IOr = 141,
    IShl = 142,
    IShr = 143,
    IXor = 144,
    UBitExtract = 145,
    UBitInsert = 146,
    UDiv = 147,
    UGe = 148,
    ULt = 149,
    UMax = 150,
    UMin = 151,
    UMod = 152,
    UShr = 153,
    F2F16 = 154,
    F162F = 155,

    DclNumThreadPerGroup = 512,
    Fence = 513,
    DclLds = 514,
    DclStructLds = 515,
    LdsLoadVec = 516,
    LdsStoreVec = 517,
    LdsReadAdd = 518,
    DclUav = 519,
    DclRawUav = 520,
    UavLoad = 521,
    UavStructLoad = 522,
    UavStore = 523,
    UavRawStore = 524,
    UavStructStore = 525,
    UavAdd = 526,
    UavReadAdd = 527,
    AppendBufAlloc = 528,
    DclRawSrv = 529,
    DclStructSrv = 530,
    SrvStructLoad = 531,

    DclNumIcp = 576,
    DclNumOcp = 577,
    HsForkPhase = 578,
    HsJoinPhase = 579,
    EndPhase = 580,
    DclTsDomain = 581,
    DclTsPartition = 582,
    DclTsOutputPrimitive = 583,
    DclMaxTessFactor = 584,

    Fetch4C = 600,
    Fetch4Po = 601,
    Fetch4PoC = 602,
    DclGlobalFlags = 608,
    Prefix = 640,
    RcpVec = 656,
    DclTypedUav = 657,
    DclTypelessUav = 658,
    Unk660 = 660,
}

impl Op {
    pub fn from_u16(x: u16) -> Option<Op> {
        <Op as num_traits::FromPrimitive>::from_u16(x)
    }

    /// Whether the opcode addresses a resource and sampler that the control
    /// word's indexed-args bit can extend with explicit index sources.
    pub fn has_indexed_resource_sampler(self) -> bool {
        matches!(
            self,
            Op::Load
                | Op::Sample
                | Op::SampleB
                | Op::SampleG
                | Op::SampleL
                | Op::SampleCLz
                | Op::Fetch4
                | Op::Fetch4C
                | Op::Fetch4Po
                | Op::Fetch4PoC
        )
    }
}

/// Fixed operand counts of an opcode, before the decode-time special cases.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpInfo {
    pub dst_count: u8,
    pub src_count: u8,
    pub extra_count: u8,
}

const fn info(dst_count: u8, src_count: u8, extra_count: u8) -> OpInfo {
    OpInfo {
        dst_count,
        src_count,
        extra_count,
    }
}

/// Operand arity of `op`.
pub fn op_info(op: Op) -> OpInfo {
    match op {
        Op::Abs => info(1, 1, 0),
        Op::Acos => info(1, 1, 0),
        Op::Add => info(1, 2, 0),
        Op::And => info(1, 2, 0),
        Op::Asin => info(1, 1, 0),
        Op::Atan => info(1, 1, 0),
        Op::Break => info(0, 0, 0),
        Op::Breakc => info(0, 2, 0),
        Op::BreakLogicalNz => info(0, 1, 0),
        Op::BreakLogicalZ => info(0, 1, 0),
        Op::Case => info(0, 0, 1),
        Op::CmovLogical => info(1, 3, 0),
        Op::Continue => info(0, 0, 0),
        Op::ContinueLogicalNz => info(0, 1, 0),
        Op::ContinueLogicalZ => info(0, 1, 0),
        Op::CosVec => info(1, 1, 0),
        Op::DclArray => info(0, 2, 0),
        Op::DclConstBuffer => info(0, 0, 0),
        Op::DclIndexedTempArray => info(0, 1, 0),
        Op::DclInput => info(1, 0, 0),
        Op::DclLiteral => info(0, 1, 4),
        Op::DclOutput => info(1, 0, 0),
        Op::DclResource => info(0, 0, 1),
        Op::Default => info(0, 0, 0),
        Op::DiscardLogicalNz => info(0, 1, 0),
        Op::DiscardLogicalZ => info(0, 1, 0),
        Op::Div => info(1, 2, 0),
        Op::Dp2 => info(1, 2, 0),
        Op::Dp3 => info(1, 2, 0),
        Op::Dp4 => info(1, 2, 0),
        Op::Dsx => info(1, 1, 0),
        Op::Dsy => info(1, 1, 0),
        Op::Else => info(0, 0, 0),
        Op::EndSwitch => info(0, 0, 0),
        Op::Eq => info(1, 2, 0),
        Op::ExpVec => info(1, 1, 0),
        Op::Fetch4 => info(1, 1, 0),
        Op::Frc => info(1, 1, 0),
        Op::Ftoi => info(1, 1, 0),
        Op::EndMain => info(0, 0, 0),
        Op::EndIf => info(0, 0, 0),
        Op::End => info(0, 0, 0),
        Op::EndLoop => info(0, 0, 0),
        Op::Ftou => info(1, 1, 0),
        Op::Ge => info(1, 2, 0),
        Op::IfLogicalNz => info(0, 1, 0),
        Op::IfLogicalZ => info(0, 1, 0),
        Op::Itof => info(1, 1, 0),
        Op::Load => info(1, 1, 0),
        Op::LogVec => info(1, 1, 0),
        Op::Lt => info(1, 2, 0),
        Op::Mad => info(1, 3, 0),
        Op::Max => info(1, 2, 0),
        Op::Min => info(1, 2, 0),
        Op::Mov => info(1, 1, 0),
        Op::Mul => info(1, 2, 0),
        Op::Ne => info(1, 2, 0),
        Op::ResInfo => info(1, 1, 0),
        Op::RetDyn => info(0, 0, 0),
        Op::RoundNear => info(1, 1, 0),
        Op::RoundNegInf => info(1, 1, 0),
        Op::RoundPlusInf => info(1, 1, 0),
        Op::RoundZero => info(1, 1, 0),
        Op::RsqVec => info(1, 1, 0),
        Op::Sample => info(1, 1, 0),
        Op::SampleB => info(1, 2, 0),
        Op::SampleCLz => info(1, 2, 0),
        Op::SampleG => info(1, 3, 0),
        Op::SampleL => info(1, 2, 0),
        Op::SinVec => info(1, 1, 0),
        Op::SqrtVec => info(1, 1, 0),
        Op::Switch => info(0, 1, 0),
        Op::Utof => info(1, 1, 0),
        Op::While => info(0, 0, 0),
        Op::IAdd => info(1, 2, 0),
        Op::IBitExtract => info(1, 3, 0),
        Op::IFirstBit => info(1, 1, 0),
        Op::IEq => info(1, 2, 0),
        Op::IGe => info(1, 2, 0),
        Op::ILt => info(1, 2, 0),
        Op::IMad => info(1, 3, 0),
        Op::IMax => info(1, 2, 0),
        Op::IMin => info(1, 2, 0),
        Op::IMul => info(1, 2, 0),
        Op::INe => info(1, 2, 0),
        Op::INegate => info(1, 1, 0),
        Op::INot => info(1, 1, 0),
        Op::IOr => info(1, 2, 0),
        Op::IShl => info(1, 2, 0),
        Op::IShr => info(1, 2, 0),
        Op::IXor => info(1, 2, 0),
        Op::UBitExtract => info(1, 3, 0),
        Op::UBitInsert => info(1, 4, 0),
        Op::UDiv => info(1, 2, 0),
        Op::UGe => info(1, 2, 0),
        Op::ULt => info(1, 2, 0),
        Op::UMax => info(1, 2, 0),
        Op::UMin => info(1, 2, 0),
        Op::UMod => info(1, 2, 0),
        Op::UShr => info(1, 2, 0),
        Op::F2F16 => info(1, 1, 0),
        Op::F162F => info(1, 1, 0),
        Op::DclNumThreadPerGroup => info(0, 0, 0),
        Op::Fence => info(0, 0, 0),
        Op::DclLds => info(0, 0, 1),
        Op::DclStructLds => info(0, 0, 2),
        Op::LdsLoadVec => info(1, 2, 0),
        Op::LdsStoreVec => info(1, 3, 0),
        Op::LdsReadAdd => info(1, 2, 0),
        Op::DclUav => info(0, 0, 0),
        Op::DclRawUav => info(0, 0, 0),
        Op::UavLoad => info(1, 1, 0),
        Op::UavStructLoad => info(1, 1, 0),
        Op::UavStore => info(0, 2, 0),
        Op::UavRawStore => info(1, 2, 0),
        Op::UavStructStore => info(1, 2, 0),
        Op::UavAdd => info(0, 2, 0),
        Op::UavReadAdd => info(1, 2, 0),
        Op::AppendBufAlloc => info(1, 0, 0),
        Op::DclRawSrv => info(0, 0, 0),
        Op::DclStructSrv => info(0, 0, 1),
        Op::SrvStructLoad => info(1, 1, 0),
        Op::DclNumIcp => info(0, 0, 1),
        Op::DclNumOcp => info(0, 0, 1),
        Op::HsForkPhase => info(0, 0, 0),
        Op::HsJoinPhase => info(0, 0, 0),
        Op::EndPhase => info(0, 0, 0),
        Op::DclTsDomain => info(0, 0, 0),
        Op::DclTsPartition => info(0, 0, 0),
        Op::DclTsOutputPrimitive => info(0, 0, 0),
        Op::DclMaxTessFactor => info(0, 0, 1),
        Op::Fetch4C => info(1, 2, 0),
        Op::Fetch4Po => info(1, 2, 0),
        Op::Fetch4PoC => info(1, 3, 0),
        Op::DclGlobalFlags => info(0, 0, 0),
        Op::Prefix => info(0, 0, 0),
        Op::RcpVec => info(1, 1, 0),
        Op::DclTypedUav => info(0, 0, 1),
        Op::DclTypelessUav => info(0, 0, 2),
        Op::Unk660 => info(1, 0, 0),
    }
}

/// Shader stage carried by the version header token. Slot 0 is reserved
/// for the undefined stage and is rejected by the decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u8)]
pub enum ShaderStage {
    Vertex = 1,
    Pixel = 2,
    Geometry = 3,
    Compute = 4,
    Hull = 5,
    Domain = 6,
}

impl ShaderStage {
    pub fn from_u32(x: u32) -> Option<ShaderStage> {
        <ShaderStage as num_traits::FromPrimitive>::from_u32(x)
    }

    /// The short stage name used in stable shader names and listings.
    pub fn mnemonic(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vs",
            ShaderStage::Pixel => "ps",
            ShaderStage::Geometry => "gs",
            ShaderStage::Compute => "cs",
            ShaderStage::Hull => "hs",
            ShaderStage::Domain => "ds",
        }
    }
}

/// Register file selectors of the operand token.
pub mod reg {
    pub const TEMP: u8 = 4;
    pub const ITEMP: u8 = 30;
    pub const CONST_BUFFER: u8 = 31;
    pub const LITERAL: u8 = 32;
    pub const INPUT: u8 = 33;
    pub const OUTPUT: u8 = 34;
    pub const LAST: u8 = 63;
}

/// Source component selectors.
pub mod compsel {
    pub const X: u8 = 0;
    pub const Y: u8 = 1;
    pub const Z: u8 = 2;
    pub const W: u8 = 3;
    pub const ZERO: u8 = 4;
    pub const ONE: u8 = 5;
}

/// Destination component write modes.
pub mod modcomp {
    pub const NOWRITE: u8 = 0;
    pub const WRITE: u8 = 1;
    pub const ZERO: u8 = 2;
    pub const ONE: u8 = 3;
}

/// Destination shift scales.
pub mod shift {
    pub const NONE: u8 = 0;
    pub const X2: u8 = 1;
    pub const X4: u8 = 2;
    pub const X8: u8 = 3;
    pub const D2: u8 = 4;
    pub const D4: u8 = 5;
    pub const D8: u8 = 6;
}

/// Source divide-component selectors.
pub mod divcomp {
    pub const NONE: u8 = 0;
    pub const Y: u8 = 1;
    pub const Z: u8 = 2;
    pub const W: u8 = 3;
    pub const UNKNOWN: u8 = 4;
}

/// Operand addressing modes.
pub mod addr {
    pub const ABSOLUTE: u32 = 0;
    pub const RELATIVE: u32 = 1;
    pub const REG_RELATIVE: u32 = 2;
}

/// Semantic attached to an input or output declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum ImportUsage {
    Position = 0,
    PointSize = 1,
    Color = 2,
    BackColor = 3,
    Fog = 4,
    PixelSampleCoverage = 5,
    Generic = 6,
    ClipDistance = 7,
    CullDistance = 8,
    PrimitiveId = 9,
    VertexId = 10,
    InstanceId = 11,
    IsFrontFace = 12,
    Lod = 13,
    Coloring = 14,
    NodeColoring = 15,
    Normal = 16,
    RenderTargetArrayIndex = 17,
    ViewportArrayIndex = 18,
    Undefined = 19,
    SampleIndex = 20,
    EdgeTessFactor = 21,
    InsideTessFactor = 22,
    DetailTessFactor = 23,
    DensityTessFactor = 24,
}

impl ImportUsage {
    pub fn from_u32(x: u32) -> Option<ImportUsage> {
        <ImportUsage as num_traits::FromPrimitive>::from_u32(x)
    }
}

/// Attribute interpolation mode of an input declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u8)]
pub enum InterpMode {
    NotUsed = 0,
    Constant = 1,
    Linear = 2,
    LinearCentroid = 3,
    LinearNoPerspective = 4,
    LinearNoPerspectiveCentroid = 5,
    LinearSample = 6,
    LinearNoPerspectiveSample = 7,
}

impl InterpMode {
    pub fn from_u32(x: u32) -> Option<InterpMode> {
        <InterpMode as num_traits::FromPrimitive>::from_u32(x)
    }
}

/// Resource dimensionality of a resource or UAV declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum PixTexUsage {
    Unknown = 0,
    OneD = 1,
    TwoD = 2,
    ThreeD = 3,
    CubeMap = 4,
    TwoDMsaa = 5,
    FourComp = 6,
    Buffer = 7,
    OneDArray = 8,
    TwoDArray = 9,
    TwoDArrayMsaa = 10,
    TwoDPlusW = 11,
    CubeMapPlusW = 12,
    CubeMapArray = 13,
}

impl PixTexUsage {
    pub fn from_u32(x: u32) -> Option<PixTexUsage> {
        <PixTexUsage as num_traits::FromPrimitive>::from_u32(x)
    }
}

/// Per-channel element format of a resource declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum ElementFormat {
    Unknown = 0,
    Snorm = 1,
    Unorm = 2,
    Sint = 3,
    Uint = 4,
    Float = 5,
    Srgb = 6,
    Mixed = 7,
}

impl ElementFormat {
    pub fn from_u32(x: u32) -> Option<ElementFormat> {
        <ElementFormat as num_traits::FromPrimitive>::from_u32(x)
    }
}

/// Global-flag bit positions of `DCL_GLOBAL_FLAGS`.
pub mod global_flag {
    pub const REFACTORING_ALLOWED: u32 = 0;
    pub const FORCE_EARLY_DEPTH_STENCIL: u32 = 1;
    pub const ENABLE_RAW_STRUCTURED_BUFFERS: u32 = 2;
    pub const ENABLE_DOUBLE_PRECISION_FLOAT_OPS: u32 = 3;
}

/// Tessellator domains of `DCL_TS_DOMAIN`.
pub mod ts_domain {
    pub const ISOLINE: u32 = 0;
    pub const TRI: u32 = 1;
    pub const QUAD: u32 = 2;
}

/// Tessellator partitioning modes of `DCL_TS_PARTITION`.
pub mod ts_partition {
    pub const INTEGER: u32 = 0;
    pub const POW2: u32 = 1;
    pub const FRACTIONAL_ODD: u32 = 2;
    pub const FRACTIONAL_EVEN: u32 = 3;
}

/// Tessellator output primitives of `DCL_TS_OUTPUT_PRIMITIVE`.
pub mod ts_output_primitive {
    pub const POINT: u32 = 0;
    pub const LINE: u32 = 1;
    pub const TRIANGLE_CW: u32 = 2;
    pub const TRIANGLE_CCW: u32 = 3;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_end_of_program_anchors() {
        assert_eq!(Op::EndMain as u16, 0x28);
        assert_eq!(Op::End as u16, 0x2A);
        assert_eq!(Op::Unk660 as u16, 660);
        assert!((Op::Unk660 as u16) < OP_LAST);
    }

    #[test]
    fn test_unknown_opcode_is_none() {
        assert_eq!(Op::from_u16(75), None);
        assert_eq!(Op::from_u16(OP_LAST), None);
        assert_eq!(Op::from_u16(Op::Mov as u16), Some(Op::Mov));
    }

    #[test]
    fn test_sample_family_is_indexed() {
        assert!(Op::Sample.has_indexed_resource_sampler());
        assert!(Op::Fetch4PoC.has_indexed_resource_sampler());
        assert!(!Op::Add.has_indexed_resource_sampler());
        assert!(!Op::SrvStructLoad.has_indexed_resource_sampler());
    }
}
