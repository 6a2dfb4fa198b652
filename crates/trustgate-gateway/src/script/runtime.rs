use std::cell::Cell;
use std::sync::Arc;

use base64::Engine;
use mlua::{ChunkMode, HookTriggers, Lua, LuaOptions, StdLib, Value as LuaValue};
use serde_json::Value;

use trustgate_core::error::{Result, TrustGateError};

use super::env::{ScriptEnv, ScriptValue};

/// Marker for base64-wrapped script text inside JSON/YAML payloads.
const BASE64_MARKER: &str = "##";

/// The instruction hook fires once per slice.
const INSTRUCTION_SLICE: u32 = 1_000;

/// Per-execution resource bounds (0 disables a bound).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptLimits {
    pub memory_limit_bytes: usize,
    pub max_instructions: u64,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            memory_limit_bytes: 16 * 1024 * 1024,
            max_instructions: 1_000_000,
        }
    }
}

/// Script validated once and executed many times. Safe Lua states refuse
/// binary chunks, so the checked source is what each execution loads.
#[derive(Debug, Clone)]
pub struct CompiledScript {
    name: Arc<str>,
    source: Arc<str>,
}

impl CompiledScript {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source after the last-line `return` rewrite.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Strip surrounding whitespace and unwrap `##<base64>` payloads.
pub fn decode_script_text(raw: &str) -> Result<String> {
    let text = raw.trim();
    match text.strip_prefix(BASE64_MARKER) {
        Some(encoded) => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| TrustGateError::Script(format!("invalid base64 script: {e}")))?;
            String::from_utf8(bytes)
                .map_err(|e| TrustGateError::Script(format!("script is not utf-8: {e}")))
        }
        None => Ok(text.to_string()),
    }
}

/// Operators write the value they want on the last line; turn it into a
/// `return` statement.
fn return_last_line(text: &str) -> String {
    let text = text.trim();
    let (body, last) = match text.rsplit_once('\n') {
        Some((body, last)) => (Some(body), last),
        None => (None, text),
    };
    let last = last.trim();
    let last = if last == "return" || last.starts_with("return ") || last.is_empty() {
        last.to_string()
    } else {
        format!("return {last}")
    };
    match body {
        Some(body) => format!("{body}\n{last}"),
        None => last,
    }
}

/// Compiles and runs scripts in throwaway sandboxed Lua states.
#[derive(Debug, Clone, Default)]
pub struct ScriptRuntime {
    limits: ScriptLimits,
}

impl ScriptRuntime {
    pub fn new(limits: ScriptLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> ScriptLimits {
        self.limits
    }

    /// Compiles `text` with its last line turned into a `return`. When the
    /// last line is a statement (`end`, an assignment, a loop) the text is
    /// compiled as written instead.
    pub fn compile(&self, name: &str, text: &str) -> Result<CompiledScript> {
        let lua = self.fresh_state()?;
        let rewritten = return_last_line(text);
        let source = if syntax_ok(&lua, name, &rewritten) {
            rewritten
        } else {
            let text = text.trim().to_string();
            lua.load(text.as_str())
                .set_name(name)
                .set_mode(ChunkMode::Text)
                .into_function()
                .map_err(|e| TrustGateError::Script(format!("compile {name} failed: {e}")))?;
            text
        };

        Ok(CompiledScript {
            name: Arc::from(name),
            source: Arc::from(source),
        })
    }

    /// Same script under another name, for error reports.
    pub fn rename(&self, script: &CompiledScript, name: &str) -> CompiledScript {
        CompiledScript {
            name: Arc::from(name),
            source: Arc::clone(&script.source),
        }
    }

    /// Run `script` with exactly the bindings in `env`.
    pub fn execute(&self, script: &CompiledScript, env: &ScriptEnv) -> Result<ScriptValue> {
        let lua = self.fresh_state()?;
        run(&lua, script, env)
            .map_err(|e| TrustGateError::Script(format!("{} failed: {e}", script.name())))
    }

    fn fresh_state(&self) -> Result<Lua> {
        let lua = Lua::new_with(
            StdLib::MATH | StdLib::STRING | StdLib::TABLE,
            LuaOptions::new(),
        )
        .map_err(|e| TrustGateError::Internal(format!("lua init failed: {e}")))?;

        if self.limits.memory_limit_bytes > 0 {
            lua.set_memory_limit(self.limits.memory_limit_bytes)
                .map_err(|e| TrustGateError::Internal(format!("lua memory limit failed: {e}")))?;
        }

        if self.limits.max_instructions > 0 {
            let max_slices = self.limits.max_instructions.div_ceil(INSTRUCTION_SLICE as u64);
            let slices = Cell::new(0u64);
            lua.set_hook(
                HookTriggers::new().every_nth_instruction(INSTRUCTION_SLICE),
                move |_lua, _debug| {
                    let n = slices.get() + 1;
                    slices.set(n);
                    if n > max_slices {
                        return Err(mlua::Error::RuntimeError(
                            "instruction budget exhausted".into(),
                        ));
                    }
                    Ok(())
                },
            );
        }

        Ok(lua)
    }
}

fn syntax_ok(lua: &Lua, name: &str, source: &str) -> bool {
    lua.load(source)
        .set_name(name)
        .set_mode(ChunkMode::Text)
        .into_function()
        .is_ok()
}

fn run(lua: &Lua, script: &CompiledScript, env: &ScriptEnv) -> mlua::Result<ScriptValue> {
    let globals = lua.globals();

    for (name, value) in env.trusted() {
        globals.set(name.as_str(), json_to_lua(lua, value)?)?;
    }
    for (name, value) in env.untrusted() {
        let existing: LuaValue = globals.raw_get(name.as_str())?;
        if !existing.is_nil() {
            tracing::debug!(script = %script.name(), var = %name, "untrusted variable shadows a built-in, skipped");
            continue;
        }
        globals.set(name.as_str(), json_to_lua(lua, value)?)?;
    }

    let func = lua
        .load(script.source())
        .set_name(script.name())
        .set_mode(ChunkMode::Text)
        .into_function()?;
    let out: LuaValue = func.call(())?;
    from_lua(out)
}

fn json_to_lua<'lua>(lua: &'lua Lua, v: &Value) -> mlua::Result<LuaValue<'lua>> {
    let lv = match v {
        Value::Null => LuaValue::Nil,
        Value::Bool(b) => LuaValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => LuaValue::Integer(i),
            None => LuaValue::Number(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => LuaValue::String(lua.create_string(s)?),
        Value::Array(arr) => {
            let tbl = lua.create_table()?;
            for (i, item) in arr.iter().enumerate() {
                tbl.set((i + 1) as i64, json_to_lua(lua, item)?)?;
            }
            LuaValue::Table(tbl)
        }
        Value::Object(map) => {
            let tbl = lua.create_table()?;
            for (k, item) in map {
                tbl.set(k.as_str(), json_to_lua(lua, item)?)?;
            }
            LuaValue::Table(tbl)
        }
    };
    Ok(lv)
}

fn from_lua(v: LuaValue) -> mlua::Result<ScriptValue> {
    Ok(match v {
        LuaValue::Nil => ScriptValue::Nil,
        LuaValue::Boolean(b) => ScriptValue::Boolean(b),
        LuaValue::Integer(i) => ScriptValue::Integer(i),
        LuaValue::Number(n) => ScriptValue::Number(n),
        LuaValue::String(s) => ScriptValue::String(s.to_str()?.to_string()),
        other => ScriptValue::Opaque(other.type_name()),
    })
}
