//! Stream driver and translation cache.

use std::collections::HashMap;

use blake3::Hash;
use tracing::{debug, warn};

use crate::glsl::{GlslDialect, GlslShaderTranslator, TranslationError};
use crate::ucode::{
    ParsedAllocInstruction, ParsedAluInstruction, ParsedCallInstruction, ParsedExecInstruction,
    ParsedJumpInstruction, ParsedLoopEndInstruction, ParsedLoopStartInstruction,
    ParsedReturnInstruction, ParsedTextureFetchInstruction, ParsedVertexFetchInstruction,
    ShaderStage, VertexBinding,
};

/// One parser callback, in source order. Exec bodies are flat: every
/// `ExecBegin` is matched by a later `ExecEnd`.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedInstruction {
    ExecBegin(ParsedExecInstruction),
    ExecEnd(ParsedExecInstruction),
    Alu(ParsedAluInstruction),
    VertexFetch(ParsedVertexFetchInstruction),
    TextureFetch(ParsedTextureFetchInstruction),
    Label { cf_index: u32 },
    ControlFlowNop,
    LoopStart(ParsedLoopStartInstruction),
    LoopEnd(ParsedLoopEndInstruction),
    Call(ParsedCallInstruction),
    Return(ParsedReturnInstruction),
    Jump(ParsedJumpInstruction),
    Alloc(ParsedAllocInstruction),
}

/// A fully parsed shader as produced by the upstream microcode parser.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedShader {
    pub stage: ShaderStage,
    pub vertex_bindings: Vec<VertexBinding>,
    pub instructions: Vec<ParsedInstruction>,
}

/// Successful translation result.
///
/// Translation never hard-fails: unsupported instructions are recorded in
/// `errors` and echoed into the emitted source as comments.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedShader {
    pub stage: ShaderStage,
    /// Emitted GLSL. Not guaranteed to be newline-terminated.
    pub glsl: Vec<u8>,
    pub errors: Vec<TranslationError>,
}

/// Drives the translator over a parsed instruction stream.
pub fn translate_parsed_shader(
    translator: &mut GlslShaderTranslator,
    shader: &ParsedShader,
) -> TranslatedShader {
    translator.reset();
    translator.start_translation(shader.stage, &shader.vertex_bindings);
    for instruction in &shader.instructions {
        match instruction {
            ParsedInstruction::ExecBegin(instr) => translator.process_exec_begin(instr),
            ParsedInstruction::ExecEnd(instr) => translator.process_exec_end(instr),
            ParsedInstruction::Alu(instr) => translator.process_alu(instr),
            ParsedInstruction::VertexFetch(instr) => translator.process_vertex_fetch(instr),
            ParsedInstruction::TextureFetch(instr) => translator.process_texture_fetch(instr),
            ParsedInstruction::Label { cf_index } => translator.process_label(*cf_index),
            ParsedInstruction::ControlFlowNop => translator.process_control_flow_nop(),
            ParsedInstruction::LoopStart(instr) => translator.process_loop_start(instr),
            ParsedInstruction::LoopEnd(instr) => translator.process_loop_end(instr),
            ParsedInstruction::Call(instr) => translator.process_call(instr),
            ParsedInstruction::Return(instr) => translator.process_return(instr),
            ParsedInstruction::Jump(instr) => translator.process_jump(instr),
            ParsedInstruction::Alloc(instr) => translator.process_alloc(instr),
        }
    }
    let glsl = translator.complete_translation();
    let errors = translator.errors().to_vec();
    if !errors.is_empty() {
        warn!(
            error_count = errors.len(),
            stage = ?shader.stage,
            "shader translated with errors"
        );
    }
    TranslatedShader {
        stage: shader.stage,
        glsl,
        errors,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedShader {
    pub hash: Hash,
    pub translation: TranslatedShader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderCacheLookupSource {
    /// The shader was already present in the in-memory cache.
    Memory,
    /// The translator ran and the output was inserted into the cache.
    Translated,
}

#[derive(Debug, Clone, Copy)]
pub struct ShaderCacheLookup<'a> {
    pub source: ShaderCacheLookupSource,
    shader: &'a CachedShader,
}

impl std::ops::Deref for ShaderCacheLookup<'_> {
    type Target = CachedShader;

    fn deref(&self) -> &Self::Target {
        self.shader
    }
}

/// In-memory translation cache keyed by the raw microcode bytes the caller
/// parsed. Owns and reuses one translator instance.
pub struct ShaderCache {
    translator: GlslShaderTranslator,
    map: HashMap<Hash, CachedShader>,
}

impl ShaderCache {
    pub fn new(dialect: GlslDialect) -> Self {
        Self {
            translator: GlslShaderTranslator::new(dialect),
            map: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the cached translation for `ucode`, translating `shader` on a
    /// miss. `shader` must be the parse of `ucode`; the bytes are only used
    /// as the identity key.
    pub fn get_or_translate(
        &mut self,
        ucode: &[u8],
        shader: &ParsedShader,
    ) -> ShaderCacheLookup<'_> {
        use std::collections::hash_map::Entry;

        let hash = blake3::hash(ucode);
        match self.map.entry(hash) {
            Entry::Occupied(e) => {
                debug!(hash = %hash.to_hex(), "shader cache hit");
                ShaderCacheLookup {
                    source: ShaderCacheLookupSource::Memory,
                    shader: e.into_mut(),
                }
            }
            Entry::Vacant(e) => {
                let translation = translate_parsed_shader(&mut self.translator, shader);
                debug!(
                    hash = %hash.to_hex(),
                    glsl_bytes = translation.glsl.len(),
                    "translated shader inserted into cache"
                );
                ShaderCacheLookup {
                    source: ShaderCacheLookupSource::Translated,
                    shader: e.insert(CachedShader { hash, translation }),
                }
            }
        }
    }
}

impl Default for ShaderCache {
    fn default() -> Self {
        Self::new(GlslDialect::Gl45)
    }
}
