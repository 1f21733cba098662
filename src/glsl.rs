//! GLSL 4.5 lowering of parsed guest shader microcode.
//!
//! [`GlslShaderTranslator`] turns the parser's per-instruction callbacks into
//! a self-contained GLSL program. The emitted source executes against a
//! single storage buffer of `StateData` blocks indexed by `gl_DrawIDARB`;
//! layout and binding slots are part of the ABI with the renderer and must
//! not change independently.
//!
//! Lowering is deliberately unoptimized: every instruction loads its
//! operands into `src0..src2`, computes into the scratch result (`pv` for
//! vector ops, `ps` for scalar ops) and stores through the declared result
//! descriptor. The host driver's compiler is expected to clean this up.

use std::fmt::Write as _;

use thiserror::Error;
use tracing::warn;

use crate::source::SourceBuilder;
use crate::ucode::{
    AddressingMode, AluOp, AluScalarOpcode, AluVectorOpcode, ExecCondition, FetchOpcode,
    InstructionResult, Operand, ParsedAllocInstruction, ParsedAluInstruction, ParsedCallInstruction,
    ParsedExecInstruction, ParsedJumpInstruction, ParsedLoopEndInstruction,
    ParsedLoopStartInstruction, ParsedReturnInstruction, ParsedTextureFetchInstruction,
    ParsedVertexFetchInstruction, ShaderStage, StorageSource, StorageTarget, SwizzleSource,
    TextureDimension, VertexBinding, VertexFormat, MAX_INTERPOLATORS, MAX_TEMP_REGISTERS,
};

/// Output dialect. Only desktop GL 4.5 is emitted today; the parameter is
/// accepted so callers can thread their choice through without an API break
/// once a second dialect exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GlslDialect {
    #[default]
    Gl45,
}

/// Diagnostic recorded while translating.
///
/// Translation errors are recoverable: the condition is echoed into the
/// emitted source as a comment and translation continues with a zero
/// fallback wherever a value is syntactically required.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("shader translation error: {message}")]
pub struct TranslationError {
    pub message: String,
}

const PREAMBLE_COMMON: &str = r#"#version 450
#extension all : warn
#extension GL_ARB_bindless_texture : require
#extension GL_ARB_explicit_uniform_location : require
#extension GL_ARB_shader_draw_parameters : require
#extension GL_ARB_shader_storage_buffer_object : require
#extension GL_ARB_shading_language_420pack : require
#extension GL_ARB_fragment_coord_conventions : require
#define FLT_MAX 3.402823466e+38
precision highp float;
precision highp int;
layout(std140, column_major) uniform;
layout(std430, column_major) buffer;

// Layout must match the draw-state block uploaded by the renderer.
struct StateData {
  vec4 window_scale;
  vec4 vtx_fmt;
  vec4 alpha_test;
  uvec2 texture_samplers[32];
  vec4 float_consts[512];
  int bool_consts[8];
  int loop_consts[32];
};
layout(binding = 0) buffer State {
  StateData states[];
};

struct VertexData {
  vec4 o[16];
};

// Cube face selection. Operands arrive pre-swizzled as src0 = R.zzxy and
// src1 = R.yxzz; returns (t, s, 2*ma, face_id) with faces numbered
// +x=0 -x=1 +y=2 -y=3 +z=4 -z=5.
vec4 cube(vec4 src0, vec4 src1) {
  vec3 src = vec3(src1.y, src1.x, src1.z);
  vec3 abs_src = abs(src);
  int face_id;
  float sc;
  float tc;
  float ma;
  if (abs_src.x > abs_src.y && abs_src.x > abs_src.z) {
    if (src.x > 0.0) {
      face_id = 0; sc = -abs_src.z; tc = -abs_src.y; ma = abs_src.x;
    } else {
      face_id = 1; sc =  abs_src.z; tc = -abs_src.y; ma = abs_src.x;
    }
  } else if (abs_src.y > abs_src.x && abs_src.y > abs_src.z) {
    if (src.y > 0.0) {
      face_id = 2; sc =  abs_src.x; tc =  abs_src.z; ma = abs_src.y;
    } else {
      face_id = 3; sc =  abs_src.x; tc = -abs_src.z; ma = abs_src.y;
    }
  } else {
    if (src.z > 0.0) {
      face_id = 4; sc =  abs_src.x; tc = -abs_src.y; ma = abs_src.z;
    } else {
      face_id = 5; sc = -abs_src.x; tc = -abs_src.y; ma = abs_src.z;
    }
  }
  float s = (sc / ma + 1.0) / 2.0;
  float t = (tc / ma + 1.0) / 2.0;
  return vec4(t, s, 2.0 * ma, float(face_id));
};
"#;

const PREAMBLE_VERTEX: &str = r#"out gl_PerVertex {
  vec4 gl_Position;
  float gl_PointSize;
  float gl_ClipDistance[];
};
layout(location = 0) flat out uint draw_id;
layout(location = 1) out VertexData vtx;
vec4 applyTransform(const in StateData state, vec4 pos) {
  if (state.vtx_fmt.w == 0.0) {
    // w carries 1/W0.
    pos.w = 1.0 / pos.w;
  }
  if (state.vtx_fmt.x != 0.0) {
    // xy were pre-multiplied by 1/W0.
    pos.xy /= pos.w;
  }
  if (state.vtx_fmt.z != 0.0) {
    // z was pre-multiplied by 1/W0.
    pos.z /= pos.w;
  }
  pos.xy *= state.window_scale.xy;
  return pos;
};
void processVertex(const in StateData state);
void main() {
  gl_Position = vec4(0.0, 0.0, 0.0, 1.0);
  gl_PointSize = 1.0;
  for (int i = 0; i < vtx.o.length(); ++i) {
    vtx.o[i] = vec4(0.0, 0.0, 0.0, 0.0);
  }
  const StateData state = states[gl_DrawIDARB];
  processVertex(state);
  gl_Position = applyTransform(state, gl_Position);
  draw_id = gl_DrawIDARB;
}
"#;

const PREAMBLE_PIXEL: &str = r#"layout(origin_upper_left, pixel_center_integer) in vec4 gl_FragCoord;
layout(location = 0) flat in uint draw_id;
layout(location = 1) in VertexData vtx;
layout(location = 0) out vec4 oC[4];
void applyAlphaTest(int alpha_func, float alpha_ref) {
  bool passes = false;
  switch (alpha_func) {
  case 0:                                          break;
  case 1: if (oC[0].a <  alpha_ref) passes = true; break;
  case 2: if (oC[0].a == alpha_ref) passes = true; break;
  case 3: if (oC[0].a <= alpha_ref) passes = true; break;
  case 4: if (oC[0].a >  alpha_ref) passes = true; break;
  case 5: if (oC[0].a != alpha_ref) passes = true; break;
  case 6: if (oC[0].a >= alpha_ref) passes = true; break;
  case 7:                           passes = true; break;
  };
  if (!passes) discard;
}
void processFragment(const in StateData state);
void main() {
  const StateData state = states[draw_id];
  processFragment(state);
  if (state.alpha_test.x != 0.0) {
    applyAlphaTest(int(state.alpha_test.y), state.alpha_test.z);
  }
}
"#;

fn vertex_format_type_name(format: VertexFormat) -> &'static str {
    match format.component_count() {
        1 => "float",
        2 => "vec2",
        3 => "vec3",
        _ => "vec4",
    }
}

/// Per-instruction microcode → GLSL lowering engine.
///
/// Lifecycle: construct once, then per shader call [`reset`], feed the
/// parser callbacks in source order starting with [`start_translation`], and
/// collect the emitted program with [`complete_translation`]. The instance
/// may be reused for subsequent shaders.
///
/// [`reset`]: GlslShaderTranslator::reset
/// [`start_translation`]: GlslShaderTranslator::start_translation
/// [`complete_translation`]: GlslShaderTranslator::complete_translation
#[derive(Debug)]
pub struct GlslShaderTranslator {
    dialect: GlslDialect,
    stage: ShaderStage,
    vertex_bindings: Vec<VertexBinding>,
    source: SourceBuilder,
    errors: Vec<TranslationError>,
}

impl GlslShaderTranslator {
    pub fn new(dialect: GlslDialect) -> Self {
        Self {
            dialect,
            stage: ShaderStage::Vertex,
            vertex_bindings: Vec::new(),
            source: SourceBuilder::new(),
            errors: Vec::new(),
        }
    }

    pub fn dialect(&self) -> GlslDialect {
        self.dialect
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Diagnostics recorded since the last [`reset`](Self::reset).
    pub fn errors(&self) -> &[TranslationError] {
        &self.errors
    }

    pub fn has_translation_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Clears all per-shader state so the instance can translate again.
    pub fn reset(&mut self) {
        self.stage = ShaderStage::Vertex;
        self.vertex_bindings.clear();
        self.source.clear();
        self.errors.clear();
    }

    /// Emits the preamble and opens the stage's process function.
    pub fn start_translation(&mut self, stage: ShaderStage, vertex_bindings: &[VertexBinding]) {
        self.stage = stage;
        self.source.append(PREAMBLE_COMMON);
        match stage {
            ShaderStage::Vertex => self.source.append(PREAMBLE_VERTEX),
            ShaderStage::Pixel => self.source.append(PREAMBLE_PIXEL),
        }

        if stage == ShaderStage::Vertex {
            for binding in vertex_bindings {
                for attrib in &binding.attributes {
                    self.source.append(&format!(
                        "layout(location = {}) in {} vf{}_{};\n",
                        attrib.attrib_index,
                        vertex_format_type_name(attrib.data_format),
                        binding.fetch_constant,
                        attrib.offset
                    ));
                }
            }
        }
        self.vertex_bindings = vertex_bindings.to_vec();

        match stage {
            ShaderStage::Vertex => {
                self.source
                    .append("void processVertex(const in StateData state) {\n");
                self.source
                    .append(&format!("  vec4 r[{MAX_TEMP_REGISTERS}];\n"));
            }
            ShaderStage::Pixel => {
                self.source
                    .append("void processFragment(const in StateData state) {\n");
                self.source
                    .append(&format!("  vec4 r[{MAX_TEMP_REGISTERS}];\n"));
                for i in 0..MAX_INTERPOLATORS {
                    self.source.append(&format!("  r[{i}] = vtx.o[{i}];\n"));
                }
            }
        }

        // Scratch state shared by every lowered instruction.
        self.source.append("  vec4 pv;\n");
        self.source.append("  float ps;\n");
        self.source.append("  bool p0 = false;\n");
        self.source.append("  int a0 = 0;\n");
        self.source.append("  vec4 src0;\n");
        self.source.append("  vec4 src1;\n");
        self.source.append("  vec4 src2;\n");
    }

    /// Closes the process function and returns the emitted program.
    pub fn complete_translation(&mut self) -> Vec<u8> {
        assert_eq!(self.source.depth(), 0, "unbalanced indentation at end of translation");
        self.source.append("}\n");
        self.source.to_bytes()
    }

    pub fn process_label(&mut self, cf_index: u32) {
        let _ = cf_index;
        self.emit_unimplemented_translation_error();
    }

    pub fn process_control_flow_nop(&mut self) {
        self.source.append("//        cnop\n");
    }

    pub fn process_exec_begin(&mut self, instr: &ParsedExecInstruction) {
        self.source.append("// ");
        instr.disassemble(&mut self.source);

        match instr.condition {
            ExecCondition::Unconditional => {
                self.source.line("{");
            }
            ExecCondition::BoolConstant { index, condition } => {
                self.source.line(&format!(
                    "if ((state.bool_consts[{}] & (1 << {})) == {}) {{",
                    index / 32,
                    index % 32,
                    if condition { '1' } else { '0' }
                ));
            }
            ExecCondition::Predicated { condition } => {
                self.source
                    .line(&format!("if ({}p0) {{", if condition { ' ' } else { '!' }));
            }
        }
        self.source.indent();
    }

    pub fn process_exec_end(&mut self, instr: &ParsedExecInstruction) {
        let _ = instr;
        self.source.unindent();
        self.source.line("}");
    }

    pub fn process_loop_start(&mut self, instr: &ParsedLoopStartInstruction) {
        self.source.append("// ");
        instr.disassemble(&mut self.source);
        self.emit_unimplemented_translation_error();
    }

    pub fn process_loop_end(&mut self, instr: &ParsedLoopEndInstruction) {
        self.source.append("// ");
        instr.disassemble(&mut self.source);
        self.emit_unimplemented_translation_error();
    }

    pub fn process_call(&mut self, instr: &ParsedCallInstruction) {
        self.source.append("// ");
        instr.disassemble(&mut self.source);
        self.emit_unimplemented_translation_error();
    }

    pub fn process_return(&mut self, instr: &ParsedReturnInstruction) {
        self.source.append("// ");
        instr.disassemble(&mut self.source);
        self.emit_unimplemented_translation_error();
    }

    pub fn process_jump(&mut self, instr: &ParsedJumpInstruction) {
        self.source.append("// ");
        instr.disassemble(&mut self.source);
        self.emit_unimplemented_translation_error();
    }

    pub fn process_alloc(&mut self, instr: &ParsedAllocInstruction) {
        self.source.append("// ");
        instr.disassemble(&mut self.source);
    }

    pub fn process_vertex_fetch(&mut self, instr: &ParsedVertexFetchInstruction) {
        self.source.append("// ");
        instr.disassemble(&mut self.source);

        if instr.is_predicated {
            self.begin_predication(instr.predicate_condition);
        }

        if instr.result.stores_non_constants() {
            for (i, operand) in instr.operands.iter().enumerate() {
                if operand.storage_source != StorageSource::VertexFetchConstant {
                    self.emit_load_operand(i, operand);
                }
            }

            match instr.opcode {
                FetchOpcode::VertexFetch => {
                    let mut lhs = String::from("pv.");
                    for i in 0..instr.attributes.data_format.component_count() {
                        lhs.push(SwizzleSource::from_component_index(i).to_char());
                    }
                    self.source.line(&format!(
                        "{lhs} = vf{}_{};",
                        instr.operands[1].storage_index,
                        instr.attributes.offset
                    ));
                }
                other => {
                    self.emit_translation_error(format!(
                        "unhandled vertex fetch opcode {}",
                        other.name()
                    ));
                    self.source.line("pv = vec4(0.0);");
                }
            }
        }

        self.emit_store_vector_result(&instr.result);

        if instr.is_predicated {
            self.end_predication();
        }
    }

    pub fn process_texture_fetch(&mut self, instr: &ParsedTextureFetchInstruction) {
        self.source.append("// ");
        instr.disassemble(&mut self.source);

        if instr.is_predicated {
            self.begin_predication(instr.predicate_condition);
        }

        for (i, operand) in instr.operands.iter().enumerate() {
            if operand.storage_source != StorageSource::TextureFetchConstant {
                self.emit_load_operand(i, operand);
            }
        }

        match instr.opcode {
            FetchOpcode::TextureFetch => {
                let fetch_constant = instr.operands[1].storage_index;
                let (constructor, coords, fallback) = match instr.dimension {
                    TextureDimension::D1 => {
                        ("sampler1D", "src0.x", "vec4(src0.x, 0.0, 0.0, 1.0)")
                    }
                    TextureDimension::D2 => {
                        ("sampler2D", "src0.xy", "vec4(src0.x, src0.y, 0.0, 1.0)")
                    }
                    TextureDimension::D3 => {
                        ("sampler3D", "src0.xyz", "vec4(src0.x, src0.y, src0.z, 1.0)")
                    }
                    TextureDimension::Cube => {
                        ("samplerCube", "src0.xyz", "vec4(src0.x, src0.y, src0.z, 1.0)")
                    }
                };
                // Null sampler handles fall back to a deterministic
                // coordinate passthrough rather than sampling.
                self.source.line(&format!(
                    "if (state.texture_samplers[{fetch_constant}] != uvec2(0u)) {{"
                ));
                self.source.line(&format!(
                    "  pv = texture({constructor}(state.texture_samplers[{fetch_constant}]), {coords});"
                ));
                self.source.line("} else {");
                self.source.line(&format!("  pv = {fallback};"));
                self.source.line("}");
            }
            FetchOpcode::GetTextureBorderColorFrac
            | FetchOpcode::GetTextureComputedLod
            | FetchOpcode::GetTextureGradients
            | FetchOpcode::GetTextureWeights
            | FetchOpcode::UnknownTextureOp => {
                self.emit_unimplemented_translation_error();
                self.source.line("pv = vec4(0.0);");
            }
            FetchOpcode::SetTextureLod
            | FetchOpcode::SetTextureGradientsHorz
            | FetchOpcode::SetTextureGradientsVert => {
                self.emit_unimplemented_translation_error();
            }
            FetchOpcode::VertexFetch => {
                self.emit_translation_error("vertex fetch opcode in texture fetch instruction");
                self.source.line("pv = vec4(0.0);");
            }
        }

        self.emit_store_vector_result(&instr.result);

        if instr.is_predicated {
            self.end_predication();
        }
    }

    pub fn process_alu(&mut self, instr: &ParsedAluInstruction) {
        self.source.append("// ");
        instr.disassemble(&mut self.source);

        match instr.op {
            AluOp::Nop => {}
            AluOp::Vector(opcode) => self.process_vector_alu(instr, opcode),
            AluOp::Scalar(opcode) => self.process_scalar_alu(instr, opcode),
        }
    }

    fn begin_predication(&mut self, condition: bool) {
        self.source
            .line(&format!("if ({}p0) {{", if condition { ' ' } else { '!' }));
        self.source.indent();
    }

    fn end_predication(&mut self) {
        self.source.unindent();
        self.source.line("}");
    }

    fn emit_translation_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(%message, "shader translation error");
        self.source.line(&format!("// TRANSLATION ERROR: {message}"));
        self.errors.push(TranslationError { message });
    }

    fn emit_unimplemented_translation_error(&mut self) {
        warn!("unimplemented shader instruction");
        self.source.line("// UNIMPLEMENTED TRANSLATION");
        self.errors.push(TranslationError {
            message: "unimplemented instruction".to_owned(),
        });
    }

    /// Emits `srcN = <expr>;` for operand slot `i`.
    fn emit_load_operand(&mut self, i: usize, operand: &Operand) {
        let mut expr = String::new();
        if operand.is_negated {
            expr.push('-');
        }
        if operand.is_absolute_value {
            expr.push_str("abs(");
        }
        let (root, index_offset) = match operand.storage_source {
            StorageSource::Register => ("r", 0),
            // The guest keeps two 256-entry float banks; lowered storage
            // concatenates them, so the pixel stage indexes the upper bank.
            StorageSource::ConstFloat => (
                "state.float_consts",
                if self.stage == ShaderStage::Pixel { 256 } else { 0 },
            ),
            StorageSource::ConstInt => ("state.loop_consts", 0),
            StorageSource::ConstBool => ("state.bool_consts", 0),
            StorageSource::VertexFetchConstant | StorageSource::TextureFetchConstant => {
                unreachable!("fetch constants are not loadable operands")
            }
        };
        expr.push_str(root);
        let index = operand.storage_index;
        match operand.addressing_mode {
            AddressingMode::Static => {
                if index_offset != 0 {
                    let _ = write!(expr, "[{index_offset}+{index}]");
                } else {
                    let _ = write!(expr, "[{index}]");
                }
            }
            AddressingMode::AddressAbsolute => {
                if index_offset != 0 {
                    let _ = write!(expr, "[{index_offset}+{index}+a0]");
                } else {
                    let _ = write!(expr, "[{index}+a0]");
                }
            }
            AddressingMode::AddressRelative => {
                if index_offset != 0 {
                    let _ = write!(expr, "[{index_offset}+{index}+aL]");
                } else {
                    let _ = write!(expr, "[{index}+aL]");
                }
            }
        }
        if operand.is_absolute_value {
            expr.push(')');
        }
        if !operand.is_standard_swizzle() {
            let count = operand.component_count as usize;
            assert!((1..=4).contains(&count), "operand component count {count}");
            expr.push('.');
            match count {
                1 => {
                    let a = operand.components[0].to_char();
                    for _ in 0..4 {
                        expr.push(a);
                    }
                }
                2 => {
                    expr.push(operand.components[0].to_char());
                    let b = operand.components[1].to_char();
                    for _ in 0..3 {
                        expr.push(b);
                    }
                }
                _ => {
                    for component in operand.components.iter().take(count) {
                        expr.push(component.to_char());
                    }
                    let last = operand.components[count - 1].to_char();
                    for _ in count..4 {
                        expr.push(last);
                    }
                }
            }
        }
        self.source.line(&format!("src{i} = {expr};"));
    }

    fn emit_store_vector_result(&mut self, result: &InstructionResult) {
        self.emit_store_result(result, "pv");
    }

    fn emit_store_scalar_result(&mut self, result: &InstructionResult) {
        self.emit_store_result(result, "vec4(ps)");
    }

    /// Writes `temp` through the result descriptor: destination root and
    /// index, write-mask selector, saturation, and output swizzle (literal
    /// `0`/`1` lanes force an element-list rewrite).
    fn emit_store_result(&mut self, result: &InstructionResult, temp: &str) {
        if !result.has_any_writes() {
            return;
        }
        let mut stmt = String::new();
        let uses_storage_index = match result.storage_target {
            StorageTarget::None => return,
            StorageTarget::Register => {
                stmt.push('r');
                true
            }
            StorageTarget::Interpolant => {
                stmt.push_str("vtx.o");
                true
            }
            StorageTarget::Position => {
                stmt.push_str("gl_Position");
                false
            }
            StorageTarget::PointSize => {
                stmt.push_str("gl_PointSize");
                false
            }
            StorageTarget::ColorTarget => {
                stmt.push_str("oC");
                true
            }
            StorageTarget::Depth => {
                stmt.push_str("gl_FragDepth");
                false
            }
        };
        if uses_storage_index {
            let index = result.storage_index;
            match result.addressing_mode {
                AddressingMode::Static => {
                    let _ = write!(stmt, "[{index}]");
                }
                AddressingMode::AddressAbsolute => {
                    let _ = write!(stmt, "[{index}+a0]");
                }
                AddressingMode::AddressRelative => {
                    let _ = write!(stmt, "[{index}+aL]");
                }
            }
        }

        let mut has_const_writes = false;
        let mut component_write_count = 0;
        if !result.is_standard_swizzle() {
            stmt.push('.');
            for (j, &written) in result.write_mask.iter().enumerate() {
                if written {
                    if result.components[j] == SwizzleSource::Zero
                        || result.components[j] == SwizzleSource::One
                    {
                        has_const_writes = true;
                    }
                    component_write_count += 1;
                    stmt.push(SwizzleSource::from_component_index(j).to_char());
                }
            }
        }

        stmt.push_str(" = ");
        if result.is_clamped {
            stmt.push_str("clamp(");
        }
        if has_const_writes {
            let _ = write!(stmt, "vec{component_write_count}(");
            let mut has_written = false;
            for (j, &written) in result.write_mask.iter().enumerate() {
                if !written {
                    continue;
                }
                if has_written {
                    stmt.push_str(", ");
                }
                has_written = true;
                match result.components[j] {
                    SwizzleSource::Zero => stmt.push_str("0.0"),
                    SwizzleSource::One => stmt.push_str("1.0"),
                    component => {
                        let _ = write!(stmt, "{temp}.{}", component.to_char());
                    }
                }
            }
            stmt.push(')');
        } else {
            stmt.push_str(temp);
            if !result.is_standard_swizzle() {
                stmt.push('.');
                for (j, &written) in result.write_mask.iter().enumerate() {
                    if written {
                        stmt.push(result.components[j].to_char());
                    }
                }
            }
        }
        if result.is_clamped {
            stmt.push_str(", 0.0, 1.0)");
        }
        stmt.push(';');
        self.source.line(&stmt);
    }

    /// Per-lane comparison producing 1.0/0.0 (`seq`, `sgt`, `sge`, `sne`).
    fn emit_vector_compare(&mut self, op: &str) {
        for lane in ["x", "y", "z", "w"] {
            self.source.line(&format!(
                "pv.{lane} = src0.{lane} {op} src1.{lane} ? 1.0 : 0.0;"
            ));
        }
    }

    /// Per-lane select against zero (`cndeq`, `cndge`, `cndgt`).
    fn emit_vector_select(&mut self, op: &str) {
        for lane in ["x", "y", "z", "w"] {
            self.source.line(&format!(
                "pv.{lane} = src0.{lane} {op} 0.0 ? src1.{lane} : src2.{lane};"
            ));
        }
    }

    /// `setp_*_push`: the `.w` lanes drive `p0`, the `.x` lanes drive `pv`.
    /// The two conditions are independent.
    fn emit_setp_push(&mut self, op: &str) {
        self.source.line(&format!(
            "p0 = src0.w == 0.0 && src1.w {op} 0.0 ? true : false;"
        ));
        self.source.line(&format!(
            "pv = vec4(src0.x == 0.0 && src1.x {op} 0.0 ? 0.0 : src0.x + 1.0);"
        ));
    }

    /// `kill_*`: discard when any lane matches against `src1`.
    fn emit_vector_kill(&mut self, op: &str) {
        self.source.line(&format!(
            "if (src0.x {op} src1.x || src0.y {op} src1.y || src0.z {op} src1.z || src0.w {op} src1.w) {{"
        ));
        self.source.line("  pv = vec4(1.0);");
        self.source.line("  discard;");
        self.source.line("} else {");
        self.source.line("  pv = vec4(0.0);");
        self.source.line("}");
    }

    fn process_vector_alu(&mut self, instr: &ParsedAluInstruction, opcode: AluVectorOpcode) {
        if instr.is_predicated {
            self.begin_predication(instr.predicate_condition);
        }

        for (i, operand) in instr.operands.iter().enumerate() {
            self.emit_load_operand(i, operand);
        }

        match opcode {
            AluVectorOpcode::Add => {
                self.source.line("pv = src0 + src1;");
            }
            AluVectorOpcode::Mul => {
                self.source.line("pv = src0 * src1;");
            }
            AluVectorOpcode::Max => {
                self.source.line("pv = max(src0, src1);");
            }
            AluVectorOpcode::Min => {
                self.source.line("pv = min(src0, src1);");
            }
            AluVectorOpcode::Seq => self.emit_vector_compare("=="),
            AluVectorOpcode::Sgt => self.emit_vector_compare(">"),
            AluVectorOpcode::Sge => self.emit_vector_compare(">="),
            AluVectorOpcode::Sne => self.emit_vector_compare("!="),
            AluVectorOpcode::Frc => {
                self.source.line("pv = fract(src0);");
            }
            AluVectorOpcode::Trunc => {
                self.source.line("pv = trunc(src0);");
            }
            AluVectorOpcode::Floor => {
                self.source.line("pv = floor(src0);");
            }
            AluVectorOpcode::Mad => {
                self.source.line("pv = (src0 * src1) + src2;");
            }
            AluVectorOpcode::CndEq => self.emit_vector_select("=="),
            AluVectorOpcode::CndGe => self.emit_vector_select(">="),
            AluVectorOpcode::CndGt => self.emit_vector_select(">"),
            AluVectorOpcode::Dp4 => {
                self.source.line("pv = dot(src0, src1).xxxx;");
            }
            AluVectorOpcode::Dp3 => {
                // Four-lane dot on padded operands to sidestep driver
                // differences in three-lane dot lowering.
                self.source
                    .line("pv = dot(vec4(src0).xyz, vec4(src1).xyz).xxxx;");
            }
            AluVectorOpcode::Dp2Add => {
                self.source
                    .line("pv = vec4(src0.x * src1.x + src0.y * src1.y + src2.x).xxxx;");
            }
            AluVectorOpcode::Cube => {
                self.source.line("pv = cube(src0, src1);");
            }
            AluVectorOpcode::Max4 => {
                self.source
                    .line("pv = max(src0.x, max(src0.y, max(src0.z, src0.w))).xxxx;");
            }
            AluVectorOpcode::SetpEqPush => self.emit_setp_push("=="),
            AluVectorOpcode::SetpNePush => self.emit_setp_push("!="),
            AluVectorOpcode::SetpGtPush => self.emit_setp_push(">"),
            AluVectorOpcode::SetpGePush => self.emit_setp_push(">="),
            AluVectorOpcode::KillEq => self.emit_vector_kill("=="),
            AluVectorOpcode::KillGt => self.emit_vector_kill(">"),
            AluVectorOpcode::KillGe => self.emit_vector_kill(">="),
            AluVectorOpcode::KillNe => self.emit_vector_kill("!="),
            AluVectorOpcode::Dst => {
                self.source.line("pv.x = 1.0;");
                self.source.line("pv.y = src0.y * src1.y;");
                self.source.line("pv.z = src0.z;");
                self.source.line("pv.w = src1.w;");
            }
            AluVectorOpcode::MaxA => {
                self.source
                    .line("a0 = clamp(int(floor(src0.w + 0.5)), -256, 255);");
                self.source.line("pv = max(src0, src1);");
            }
        }

        self.emit_store_vector_result(&instr.result);

        if instr.is_predicated {
            self.end_predication();
        }
    }

    /// `seqs`/`sgts`/`sges`/`snes`: compare `src0.x` against zero.
    fn emit_scalar_compare(&mut self, op: &str) {
        self.source
            .line(&format!("ps = src0.x {op} 0.0 ? 1.0 : 0.0;"));
    }

    /// `setp_*`: `p0` and `ps` both derive from one comparison of `src0.x`.
    fn emit_scalar_setp(&mut self, op: &str) {
        self.source.line(&format!("if (src0.x {op} 0.0) {{"));
        self.source.line("  ps = 0.0;");
        self.source.line("  p0 = true;");
        self.source.line("} else {");
        self.source.line("  ps = 1.0;");
        self.source.line("  p0 = false;");
        self.source.line("}");
    }

    /// `kills_*`: discard when `src0.x` matches.
    fn emit_scalar_kill(&mut self, condition: &str) {
        self.source.line(&format!("if ({condition}) {{"));
        self.source.line("  ps = 1.0;");
        self.source.line("  discard;");
        self.source.line("} else {");
        self.source.line("  ps = 0.0;");
        self.source.line("}");
    }

    fn process_scalar_alu(&mut self, instr: &ParsedAluInstruction, opcode: AluScalarOpcode) {
        if instr.is_predicated {
            self.begin_predication(instr.predicate_condition);
        }

        for (i, operand) in instr.operands.iter().enumerate() {
            self.emit_load_operand(i, operand);
        }

        match opcode {
            AluScalarOpcode::Adds => {
                self.source.line("ps = src0.x + src0.y;");
            }
            AluScalarOpcode::AddsPrev => {
                self.source.line("ps = src0.x + ps;");
            }
            AluScalarOpcode::Muls => {
                self.source.line("ps = src0.x * src0.y;");
            }
            AluScalarOpcode::MulsPrev => {
                self.source.line("ps = src0.x * ps;");
            }
            AluScalarOpcode::MulsPrev2 => {
                // Guest saturation rule: a poisoned or non-positive chain
                // forces -FLT_MAX instead of multiplying.
                self.source.line(
                    "ps = ps == -FLT_MAX || isinf(ps) || isnan(ps) || isnan(src0.y) || src0.y <= 0.0 ? -FLT_MAX : src0.x * ps;",
                );
            }
            AluScalarOpcode::Maxs => {
                self.source.line("ps = max(src0.x, src0.y);");
            }
            AluScalarOpcode::Mins => {
                self.source.line("ps = min(src0.x, src0.y);");
            }
            AluScalarOpcode::Seqs => self.emit_scalar_compare("=="),
            AluScalarOpcode::Sgts => self.emit_scalar_compare(">"),
            AluScalarOpcode::Sges => self.emit_scalar_compare(">="),
            AluScalarOpcode::Snes => self.emit_scalar_compare("!="),
            AluScalarOpcode::Frcs => {
                self.source.line("ps = fract(src0.x);");
            }
            AluScalarOpcode::Truncs => {
                self.source.line("ps = trunc(src0.x);");
            }
            AluScalarOpcode::Floors => {
                self.source.line("ps = floor(src0.x);");
            }
            AluScalarOpcode::Exp => {
                self.source.line("ps = exp2(src0.x);");
            }
            AluScalarOpcode::Logc => {
                self.source.line("ps = log2(src0.x);");
                self.source.line("ps = isinf(ps) ? -FLT_MAX : ps;");
            }
            AluScalarOpcode::Log => {
                self.source.line("ps = log2(src0.x);");
            }
            AluScalarOpcode::Rcpc => {
                self.source.line("ps = 1.0 / src0.x;");
                self.source.line("if (isinf(ps)) ps = FLT_MAX;");
            }
            AluScalarOpcode::Rcpf => {
                self.source.line("ps = 1.0 / src0.x;");
                self.source.line("if (isinf(ps)) ps = 0.0;");
            }
            AluScalarOpcode::Rcp => {
                self.source.line("ps = 1.0 / src0.x;");
            }
            AluScalarOpcode::Rsqc => {
                self.source.line("ps = inversesqrt(src0.x);");
                self.source.line("if (isinf(ps)) ps = FLT_MAX;");
            }
            AluScalarOpcode::Rsqf => {
                self.source.line("ps = inversesqrt(src0.x);");
                self.source.line("if (isinf(ps)) ps = 0.0;");
            }
            AluScalarOpcode::Rsq => {
                self.source.line("ps = inversesqrt(src0.x);");
            }
            AluScalarOpcode::MaxAs => {
                self.source
                    .line("a0 = clamp(int(floor(src0.x + 0.5)), -256, 255);");
                self.source.line("ps = max(src0.x, src0.y);");
            }
            AluScalarOpcode::MaxAsf => {
                self.source
                    .line("a0 = clamp(int(floor(src0.x)), -256, 255);");
                self.source.line("ps = max(src0.x, src0.y);");
            }
            AluScalarOpcode::Subs => {
                self.source.line("ps = src0.x - src0.y;");
            }
            AluScalarOpcode::SubsPrev => {
                self.source.line("ps = src0.x - ps;");
            }
            AluScalarOpcode::SetpEq => self.emit_scalar_setp("=="),
            AluScalarOpcode::SetpNe => self.emit_scalar_setp("!="),
            AluScalarOpcode::SetpGt => self.emit_scalar_setp(">"),
            AluScalarOpcode::SetpGe => self.emit_scalar_setp(">="),
            AluScalarOpcode::SetpInv => {
                self.source.line("if (src0.x == 1.0) {");
                self.source.line("  ps = 0.0;");
                self.source.line("  p0 = true;");
                self.source.line("} else {");
                self.source.line("  ps = src0.x == 0.0 ? 1.0 : src0.x;");
                self.source.line("  p0 = false;");
                self.source.line("}");
            }
            AluScalarOpcode::SetpPop => {
                self.source.line("if (src0.x - 1.0 <= 0.0) {");
                self.source.line("  ps = 0.0;");
                self.source.line("  p0 = true;");
                self.source.line("} else {");
                self.source.line("  ps = src0.x - 1.0;");
                self.source.line("  p0 = false;");
                self.source.line("}");
            }
            AluScalarOpcode::SetpClr => {
                self.source.line("ps = FLT_MAX;");
                self.source.line("p0 = false;");
            }
            AluScalarOpcode::SetpRstr => {
                self.source.line("ps = src0.x;");
                self.source.line("p0 = src0.x == 0.0 ? true : false;");
            }
            AluScalarOpcode::KillsEq => self.emit_scalar_kill("src0.x == 0.0"),
            AluScalarOpcode::KillsGt => self.emit_scalar_kill("src0.x > 0.0"),
            AluScalarOpcode::KillsGe => self.emit_scalar_kill("src0.x >= 0.0"),
            AluScalarOpcode::KillsNe => self.emit_scalar_kill("src0.x != 0.0"),
            AluScalarOpcode::KillsOne => self.emit_scalar_kill("src0.x == 1.0"),
            AluScalarOpcode::Sqrt => {
                self.source.line("ps = sqrt(src0.x);");
            }
            AluScalarOpcode::Mulsc0 | AluScalarOpcode::Mulsc1 => {
                self.source.line("ps = src0.x * src1.x;");
            }
            AluScalarOpcode::Addsc0 | AluScalarOpcode::Addsc1 => {
                self.source.line("ps = src0.x + src1.x;");
            }
            AluScalarOpcode::Subsc0 | AluScalarOpcode::Subsc1 => {
                self.source.line("ps = src0.x - src1.x;");
            }
            AluScalarOpcode::Sin => {
                self.source.line("ps = sin(src0.x);");
            }
            AluScalarOpcode::Cos => {
                self.source.line("ps = cos(src0.x);");
            }
            AluScalarOpcode::RetainPrev => {
                // ps carries over from the previous instruction.
            }
        }

        self.emit_store_scalar_result(&instr.result);

        if instr.is_predicated {
            self.end_predication();
        }
    }
}
