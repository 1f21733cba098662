//! Parsed guest shader microcode model.
//!
//! The upstream microcode parser produces these records; the GLSL lowering
//! engine consumes them. The opcode enumerations are closed: adding a variant
//! forces a compile-time update to every lowering table.

use std::fmt::Write as _;

use crate::source::SourceBuilder;

/// Interpolator slots carried between the vertex and pixel stages.
pub const MAX_INTERPOLATORS: usize = 16;
/// Temporary register file size (`r0..r63`).
pub const MAX_TEMP_REGISTERS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

/// One lane of a swizzle. `Zero`/`One` are valid only in result output
/// swizzles, where they select a literal constant instead of a source lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwizzleSource {
    X,
    Y,
    Z,
    W,
    Zero,
    One,
}

impl SwizzleSource {
    /// Identity swizzle.
    pub const XYZW: [SwizzleSource; 4] = [
        SwizzleSource::X,
        SwizzleSource::Y,
        SwizzleSource::Z,
        SwizzleSource::W,
    ];

    pub fn from_component_index(index: usize) -> Self {
        match index {
            0 => SwizzleSource::X,
            1 => SwizzleSource::Y,
            2 => SwizzleSource::Z,
            3 => SwizzleSource::W,
            _ => unreachable!("component index {index} out of range"),
        }
    }

    pub fn to_char(self) -> char {
        match self {
            SwizzleSource::X => 'x',
            SwizzleSource::Y => 'y',
            SwizzleSource::Z => 'z',
            SwizzleSource::W => 'w',
            SwizzleSource::Zero => '0',
            SwizzleSource::One => '1',
        }
    }
}

/// Where an operand's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageSource {
    Register,
    ConstFloat,
    ConstInt,
    ConstBool,
    /// Names a vertex fetch-constant slot; never loaded as an ALU value.
    VertexFetchConstant,
    /// Names a texture fetch-constant slot; never loaded as an ALU value.
    TextureFetchConstant,
}

/// How a storage index is combined with the address registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Static,
    /// `[k + a0]`
    AddressAbsolute,
    /// `[k + aL]`
    AddressRelative,
}

/// Where a result is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageTarget {
    None,
    Register,
    Interpolant,
    Position,
    PointSize,
    ColorTarget,
    Depth,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Operand {
    pub storage_source: StorageSource,
    pub storage_index: u32,
    pub addressing_mode: AddressingMode,
    pub is_negated: bool,
    pub is_absolute_value: bool,
    /// Declared component count, 1..=4.
    pub component_count: u8,
    /// Swizzle lanes; only the first `component_count` entries are meaningful.
    pub components: [SwizzleSource; 4],
}

impl Operand {
    /// True iff the operand reads all four lanes in identity order.
    pub fn is_standard_swizzle(&self) -> bool {
        self.component_count == 4 && self.components == SwizzleSource::XYZW
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstructionResult {
    pub storage_target: StorageTarget,
    pub storage_index: u32,
    pub addressing_mode: AddressingMode,
    /// Saturate the stored value to [0, 1].
    pub is_clamped: bool,
    pub write_mask: [bool; 4],
    /// Output swizzle; lanes may be `Zero`/`One` to write literals.
    pub components: [SwizzleSource; 4],
}

impl InstructionResult {
    pub fn has_any_writes(&self) -> bool {
        self.write_mask.iter().any(|&w| w)
    }

    /// True iff all four lanes are written in identity order.
    pub fn is_standard_swizzle(&self) -> bool {
        self.write_mask == [true; 4] && self.components == SwizzleSource::XYZW
    }

    /// True iff at least one written lane stores a non-literal component.
    pub fn stores_non_constants(&self) -> bool {
        self.write_mask
            .iter()
            .zip(self.components.iter())
            .any(|(&written, &component)| {
                written && component != SwizzleSource::Zero && component != SwizzleSource::One
            })
    }
}

/// Execution guard of an `exec` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecCondition {
    Unconditional,
    /// Guarded by one bit of the bool-constant file.
    BoolConstant { index: u32, condition: bool },
    /// Guarded by the predicate register.
    Predicated { condition: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedExecInstruction {
    pub condition: ExecCondition,
}

impl ParsedExecInstruction {
    pub fn disassemble(&self, out: &mut SourceBuilder) {
        match self.condition {
            ExecCondition::Unconditional => {
                let _ = writeln!(out, "exec");
            }
            ExecCondition::BoolConstant { index, condition } => {
                let _ = writeln!(out, "cexec {}b{}", if condition { "" } else { "!" }, index);
            }
            ExecCondition::Predicated { condition } => {
                let _ = writeln!(out, "({}p0) exec", if condition { "" } else { "!" });
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluVectorOpcode {
    Add,
    Mul,
    Max,
    Min,
    Seq,
    Sgt,
    Sge,
    Sne,
    Frc,
    Trunc,
    Floor,
    Mad,
    CndEq,
    CndGe,
    CndGt,
    Dp4,
    Dp3,
    Dp2Add,
    Cube,
    Max4,
    SetpEqPush,
    SetpNePush,
    SetpGtPush,
    SetpGePush,
    KillEq,
    KillGt,
    KillGe,
    KillNe,
    Dst,
    MaxA,
}

impl AluVectorOpcode {
    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Mul => "mul",
            Self::Max => "max",
            Self::Min => "min",
            Self::Seq => "seq",
            Self::Sgt => "sgt",
            Self::Sge => "sge",
            Self::Sne => "sne",
            Self::Frc => "frc",
            Self::Trunc => "trunc",
            Self::Floor => "floor",
            Self::Mad => "mad",
            Self::CndEq => "cndeq",
            Self::CndGe => "cndge",
            Self::CndGt => "cndgt",
            Self::Dp4 => "dp4",
            Self::Dp3 => "dp3",
            Self::Dp2Add => "dp2add",
            Self::Cube => "cube",
            Self::Max4 => "max4",
            Self::SetpEqPush => "setp_eq_push",
            Self::SetpNePush => "setp_ne_push",
            Self::SetpGtPush => "setp_gt_push",
            Self::SetpGePush => "setp_ge_push",
            Self::KillEq => "kill_eq",
            Self::KillGt => "kill_gt",
            Self::KillGe => "kill_ge",
            Self::KillNe => "kill_ne",
            Self::Dst => "dst",
            Self::MaxA => "maxa",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluScalarOpcode {
    Adds,
    AddsPrev,
    Muls,
    MulsPrev,
    MulsPrev2,
    Maxs,
    Mins,
    Seqs,
    Sgts,
    Sges,
    Snes,
    Frcs,
    Truncs,
    Floors,
    Exp,
    Logc,
    Log,
    Rcpc,
    Rcpf,
    Rcp,
    Rsqc,
    Rsqf,
    Rsq,
    MaxAs,
    MaxAsf,
    Subs,
    SubsPrev,
    SetpEq,
    SetpNe,
    SetpGt,
    SetpGe,
    SetpInv,
    SetpPop,
    SetpClr,
    SetpRstr,
    KillsEq,
    KillsGt,
    KillsGe,
    KillsNe,
    KillsOne,
    Sqrt,
    Mulsc0,
    Mulsc1,
    Addsc0,
    Addsc1,
    Subsc0,
    Subsc1,
    Sin,
    Cos,
    RetainPrev,
}

impl AluScalarOpcode {
    pub fn name(self) -> &'static str {
        match self {
            Self::Adds => "adds",
            Self::AddsPrev => "adds_prev",
            Self::Muls => "muls",
            Self::MulsPrev => "muls_prev",
            Self::MulsPrev2 => "muls_prev2",
            Self::Maxs => "maxs",
            Self::Mins => "mins",
            Self::Seqs => "seqs",
            Self::Sgts => "sgts",
            Self::Sges => "sges",
            Self::Snes => "snes",
            Self::Frcs => "frcs",
            Self::Truncs => "truncs",
            Self::Floors => "floors",
            Self::Exp => "exp",
            Self::Logc => "logc",
            Self::Log => "log",
            Self::Rcpc => "rcpc",
            Self::Rcpf => "rcpf",
            Self::Rcp => "rcp",
            Self::Rsqc => "rsqc",
            Self::Rsqf => "rsqf",
            Self::Rsq => "rsq",
            Self::MaxAs => "maxas",
            Self::MaxAsf => "maxasf",
            Self::Subs => "subs",
            Self::SubsPrev => "subs_prev",
            Self::SetpEq => "setp_eq",
            Self::SetpNe => "setp_ne",
            Self::SetpGt => "setp_gt",
            Self::SetpGe => "setp_ge",
            Self::SetpInv => "setp_inv",
            Self::SetpPop => "setp_pop",
            Self::SetpClr => "setp_clr",
            Self::SetpRstr => "setp_rstr",
            Self::KillsEq => "kills_eq",
            Self::KillsGt => "kills_gt",
            Self::KillsGe => "kills_ge",
            Self::KillsNe => "kills_ne",
            Self::KillsOne => "kills_one",
            Self::Sqrt => "sqrt",
            Self::Mulsc0 => "mulsc0",
            Self::Mulsc1 => "mulsc1",
            Self::Addsc0 => "addsc0",
            Self::Addsc1 => "addsc1",
            Self::Subsc0 => "subsc0",
            Self::Subsc1 => "subsc1",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::RetainPrev => "retain_prev",
        }
    }
}

/// ALU sub-kind with its opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Nop,
    Vector(AluVectorOpcode),
    Scalar(AluScalarOpcode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAluInstruction {
    pub op: AluOp,
    pub is_predicated: bool,
    pub predicate_condition: bool,
    /// Up to three operands, in `src0..src2` order.
    pub operands: Vec<Operand>,
    pub result: InstructionResult,
}

impl ParsedAluInstruction {
    pub fn disassemble(&self, out: &mut SourceBuilder) {
        write_predicate_prefix(out, self.is_predicated, self.predicate_condition);
        let name = match self.op {
            AluOp::Nop => "nop",
            AluOp::Vector(opcode) => opcode.name(),
            AluOp::Scalar(opcode) => opcode.name(),
        };
        let _ = write!(out, "{name} ");
        write_disasm_result(out, &self.result);
        for operand in &self.operands {
            let _ = write!(out, ", ");
            write_disasm_operand(out, operand);
        }
        let _ = writeln!(out);
    }
}

/// Fetch-unit opcode, shared by vertex and texture fetch records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOpcode {
    VertexFetch,
    TextureFetch,
    GetTextureBorderColorFrac,
    GetTextureComputedLod,
    GetTextureGradients,
    GetTextureWeights,
    SetTextureLod,
    SetTextureGradientsHorz,
    SetTextureGradientsVert,
    UnknownTextureOp,
}

impl FetchOpcode {
    pub fn name(self) -> &'static str {
        match self {
            Self::VertexFetch => "vfetch",
            Self::TextureFetch => "tfetch",
            Self::GetTextureBorderColorFrac => "getTexBorderColorFrac",
            Self::GetTextureComputedLod => "getTexComputedLod",
            Self::GetTextureGradients => "getTexGradients",
            Self::GetTextureWeights => "getTexWeights",
            Self::SetTextureLod => "setTexLod",
            Self::SetTextureGradientsHorz => "setTexGradientsHorz",
            Self::SetTextureGradientsVert => "setTexGradientsVert",
            Self::UnknownTextureOp => "unknownTexOp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureDimension {
    D1,
    D2,
    D3,
    Cube,
}

impl TextureDimension {
    pub fn name(self) -> &'static str {
        match self {
            Self::D1 => "1D",
            Self::D2 => "2D",
            Self::D3 => "3D",
            Self::Cube => "Cube",
        }
    }
}

/// Guest vertex data format, named after the packed bit layout.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    K_32,
    K_32_FLOAT,
    K_16_16,
    K_32_32,
    K_16_16_FLOAT,
    K_32_32_FLOAT,
    K_10_11_11,
    K_11_11_10,
    K_32_32_32_FLOAT,
    K_8_8_8_8,
    K_2_10_10_10,
    K_16_16_16_16,
    K_32_32_32_32,
    K_16_16_16_16_FLOAT,
    K_32_32_32_32_FLOAT,
}

impl VertexFormat {
    pub fn component_count(self) -> usize {
        match self {
            Self::K_32 | Self::K_32_FLOAT => 1,
            Self::K_16_16 | Self::K_32_32 | Self::K_16_16_FLOAT | Self::K_32_32_FLOAT => 2,
            Self::K_10_11_11 | Self::K_11_11_10 | Self::K_32_32_32_FLOAT => 3,
            Self::K_8_8_8_8
            | Self::K_2_10_10_10
            | Self::K_16_16_16_16
            | Self::K_32_32_32_32
            | Self::K_16_16_16_16_FLOAT
            | Self::K_32_32_32_32_FLOAT => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::K_32 => "32",
            Self::K_32_FLOAT => "32_FLOAT",
            Self::K_16_16 => "16_16",
            Self::K_32_32 => "32_32",
            Self::K_16_16_FLOAT => "16_16_FLOAT",
            Self::K_32_32_FLOAT => "32_32_FLOAT",
            Self::K_10_11_11 => "10_11_11",
            Self::K_11_11_10 => "11_11_10",
            Self::K_32_32_32_FLOAT => "32_32_32_FLOAT",
            Self::K_8_8_8_8 => "8_8_8_8",
            Self::K_2_10_10_10 => "2_10_10_10",
            Self::K_16_16_16_16 => "16_16_16_16",
            Self::K_32_32_32_32 => "32_32_32_32",
            Self::K_16_16_16_16_FLOAT => "16_16_16_16_FLOAT",
            Self::K_32_32_32_32_FLOAT => "32_32_32_32_FLOAT",
        }
    }
}

/// Data-format attributes decoded from a vertex fetch instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchAttributes {
    pub data_format: VertexFormat,
    /// Offset in words within the fetched element.
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedVertexFetchInstruction {
    pub opcode: FetchOpcode,
    pub is_predicated: bool,
    pub predicate_condition: bool,
    /// `[source, fetch constant]`.
    pub operands: Vec<Operand>,
    pub attributes: FetchAttributes,
    pub result: InstructionResult,
}

impl ParsedVertexFetchInstruction {
    pub fn disassemble(&self, out: &mut SourceBuilder) {
        write_predicate_prefix(out, self.is_predicated, self.predicate_condition);
        let _ = write!(out, "{} ", self.opcode.name());
        write_disasm_result(out, &self.result);
        for operand in &self.operands {
            let _ = write!(out, ", ");
            write_disasm_operand(out, operand);
        }
        let _ = writeln!(
            out,
            ", format={}, offset={}",
            self.attributes.data_format.name(),
            self.attributes.offset
        );
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTextureFetchInstruction {
    pub opcode: FetchOpcode,
    pub dimension: TextureDimension,
    pub is_predicated: bool,
    pub predicate_condition: bool,
    /// `[coordinates, fetch constant]`.
    pub operands: Vec<Operand>,
    pub result: InstructionResult,
}

impl ParsedTextureFetchInstruction {
    pub fn disassemble(&self, out: &mut SourceBuilder) {
        write_predicate_prefix(out, self.is_predicated, self.predicate_condition);
        let _ = write!(out, "{}", self.opcode.name());
        if self.opcode == FetchOpcode::TextureFetch {
            let _ = write!(out, "{}", self.dimension.name());
        }
        let _ = write!(out, " ");
        write_disasm_result(out, &self.result);
        for operand in &self.operands {
            let _ = write!(out, ", ");
            write_disasm_operand(out, operand);
        }
        let _ = writeln!(out);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedLoopStartInstruction {
    pub loop_constant_index: u32,
    pub is_repeat: bool,
}

impl ParsedLoopStartInstruction {
    pub fn disassemble(&self, out: &mut SourceBuilder) {
        let name = if self.is_repeat { "rep" } else { "loop" };
        let _ = writeln!(out, "{name} i{}", self.loop_constant_index);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedLoopEndInstruction {
    pub loop_constant_index: u32,
}

impl ParsedLoopEndInstruction {
    pub fn disassemble(&self, out: &mut SourceBuilder) {
        let _ = writeln!(out, "endloop i{}", self.loop_constant_index);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedCallInstruction {
    pub target_address: u32,
}

impl ParsedCallInstruction {
    pub fn disassemble(&self, out: &mut SourceBuilder) {
        let _ = writeln!(out, "call 0x{:x}", self.target_address);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParsedReturnInstruction;

impl ParsedReturnInstruction {
    pub fn disassemble(&self, out: &mut SourceBuilder) {
        let _ = writeln!(out, "ret");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedJumpInstruction {
    pub target_address: u32,
}

impl ParsedJumpInstruction {
    pub fn disassemble(&self, out: &mut SourceBuilder) {
        let _ = writeln!(out, "jmp 0x{:x}", self.target_address);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocType {
    Position,
    Interpolators,
    ColorTargets,
    Memory,
}

impl AllocType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::Interpolators => "interpolators",
            Self::ColorTargets => "colors",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedAllocInstruction {
    pub alloc_type: AllocType,
}

impl ParsedAllocInstruction {
    pub fn disassemble(&self, out: &mut SourceBuilder) {
        let _ = writeln!(out, "alloc {}", self.alloc_type.name());
    }
}

/// One vertex attribute served by a fetch-constant binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    /// Host-side attribute location.
    pub attrib_index: u32,
    pub data_format: VertexFormat,
    /// Offset in words within the fetched element.
    pub offset: u32,
}

/// Attributes grouped by the fetch constant that serves them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexBinding {
    pub fetch_constant: u32,
    pub attributes: Vec<VertexAttribute>,
}

fn write_predicate_prefix(out: &mut SourceBuilder, is_predicated: bool, condition: bool) {
    if is_predicated {
        let _ = write!(out, "({}p0) ", if condition { "" } else { "!" });
    }
}

fn write_disasm_operand(out: &mut SourceBuilder, operand: &Operand) {
    if operand.is_negated {
        let _ = write!(out, "-");
    }
    if operand.is_absolute_value {
        let _ = write!(out, "abs(");
    }
    let prefix = match operand.storage_source {
        StorageSource::Register => "r",
        StorageSource::ConstFloat => "c",
        StorageSource::ConstInt => "i",
        StorageSource::ConstBool => "b",
        StorageSource::VertexFetchConstant => "vf",
        StorageSource::TextureFetchConstant => "tf",
    };
    let index = operand.storage_index;
    match operand.addressing_mode {
        AddressingMode::Static => {
            let _ = write!(out, "{prefix}{index}");
        }
        AddressingMode::AddressAbsolute => {
            let _ = write!(out, "{prefix}[{index}+a0]");
        }
        AddressingMode::AddressRelative => {
            let _ = write!(out, "{prefix}[{index}+aL]");
        }
    }
    if operand.is_absolute_value {
        let _ = write!(out, ")");
    }
    if !operand.is_standard_swizzle() {
        let _ = write!(out, ".");
        for component in operand.components.iter().take(operand.component_count as usize) {
            let _ = write!(out, "{}", component.to_char());
        }
    }
}

fn write_disasm_result(out: &mut SourceBuilder, result: &InstructionResult) {
    let index = result.storage_index;
    match result.storage_target {
        StorageTarget::None => {
            let _ = write!(out, "_");
            return;
        }
        StorageTarget::Register => {
            let _ = write!(out, "r{index}");
        }
        StorageTarget::Interpolant => {
            let _ = write!(out, "o{index}");
        }
        StorageTarget::Position => {
            let _ = write!(out, "oPos");
        }
        StorageTarget::PointSize => {
            let _ = write!(out, "oPts");
        }
        StorageTarget::ColorTarget => {
            let _ = write!(out, "oC{index}");
        }
        StorageTarget::Depth => {
            let _ = write!(out, "oDepth");
        }
    }
    if result.write_mask != [true; 4] && result.has_any_writes() {
        let _ = write!(out, ".");
        for (component_index, &written) in result.write_mask.iter().enumerate() {
            if written {
                let _ = write!(
                    out,
                    "{}",
                    SwizzleSource::from_component_index(component_index).to_char()
                );
            }
        }
    }
}
