//! file: core/src/program.rs
//! description: host-facing entry point.
//!
//! A `Program` owns everything a script defines: registered kernels and
//! functions, global static bindings (fields, constants) and the cache of
//! compiled kernel specializations. `call` picks (or lowers) the
//! specialization for the argument signature and runs it on the reference
//! executor.

use std::collections::HashMap;
use std::sync::Arc;

use crate::analyzers::{DiagnosticKind, KernelSyntaxError};
use crate::ast::{AstNodeKind, generate_ast_from_source};
use crate::config::CompileConfig;
use crate::error::{Level, TilangErrorExt};
use crate::ir::lower::{ArgSpec, StaticValue, lower_kernel, lower_script_statement};
use crate::ir::module::KernelIr;
use crate::ir::value::Value;
use crate::registry::{FunctionDescriptor, FunctionRole, ParamKind, Registry};
use crate::script::Script;
use crate::vm::external::SparseMatrixBuilder;
use crate::vm::field::{Field, NdArray};
use crate::vm::sink::{PrintSink, StdoutSink};
use crate::vm::{RuntimeArg, run_kernel};

const ISSUER: &str = "tilang.program";

/// A host value passed to a kernel.
#[derive(Debug, Clone)]
pub enum KernelArg {
    Int(i64),
    Float(f64),
    Field(Field),
    NdArray(NdArray),
    SparseBuilder(SparseMatrixBuilder),
    /// Any compile-time value, for `template()` parameters.
    Template(StaticValue),
    /// A global binding of the program, looked up by name.
    Global(String),
}

impl From<i64> for KernelArg {
    fn from(v: i64) -> Self {
        KernelArg::Int(v)
    }
}

impl From<f64> for KernelArg {
    fn from(v: f64) -> Self {
        KernelArg::Float(v)
    }
}

impl From<Field> for KernelArg {
    fn from(f: Field) -> Self {
        KernelArg::Field(f)
    }
}

impl From<NdArray> for KernelArg {
    fn from(a: NdArray) -> Self {
        KernelArg::NdArray(a)
    }
}

impl From<SparseMatrixBuilder> for KernelArg {
    fn from(b: SparseMatrixBuilder) -> Self {
        KernelArg::SparseBuilder(b)
    }
}

/// Per-argument compile keys of one kernel invocation.
pub type Signature = Vec<String>;

pub struct Program {
    config: CompileConfig,
    registry: Registry,
    globals: HashMap<String, StaticValue>,
    cache: HashMap<(String, Signature), Arc<KernelIr>>,
    sink: Arc<dyn PrintSink>,
}

fn program_error(kind: DiagnosticKind, message: String, desc: Option<&FunctionDescriptor>) -> Box<dyn TilangErrorExt> {
    Box::new(KernelSyntaxError::with(
        kind,
        Level::Error,
        message,
        ISSUER.to_string(),
        desc.and_then(|d| d.location.clone()),
        desc.and_then(|d| d.span.clone()),
    ))
}

impl Program {
    pub fn new(config: CompileConfig) -> Self {
        Program {
            config,
            registry: Registry::new(),
            globals: HashMap::new(),
            cache: HashMap::new(),
            sink: Arc::new(StdoutSink),
        }
    }

    /// Routes `print` output (script level and kernels) to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn PrintSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn from_script(script: &Script, config: CompileConfig) -> Result<Self, Box<dyn TilangErrorExt>> {
        let mut program = Program::new(config);
        program.load_source(script)?;
        Ok(program)
    }

    pub fn config(&self) -> &CompileConfig {
        &self.config
    }

    /// Registers the definitions of `script` and evaluates its other
    /// top-level statements in order.
    pub fn load_source(&mut self, script: &Script) -> Result<(), Box<dyn TilangErrorExt>> {
        let ast = generate_ast_from_source(script)?;
        let AstNodeKind::Script { body } = &ast.kind else {
            return Err(program_error(DiagnosticKind::Syntax, format!("{} did not parse to a script", script.name), None));
        };
        for stmt in body {
            if let AstNodeKind::FunctionDef { .. } = &stmt.kind {
                self.registry.register(stmt)?;
                self.cache.clear();
                continue;
            }
            let bound = lower_script_statement(stmt, &self.config, &self.registry, &self.globals, self.sink.as_ref())?;
            if !bound.is_empty() {
                self.globals.extend(bound);
                self.cache.clear();
            }
        }
        log::debug!(
            "[program] loaded {}: {} definitions, {} globals",
            script.name,
            self.registry.len(),
            self.globals.len()
        );
        Ok(())
    }

    pub fn global(&self, name: &str) -> Option<&StaticValue> {
        self.globals.get(name)
    }

    /// Binds a global. Compiled kernels capture globals, so the cache is
    /// dropped.
    pub fn set_global(&mut self, name: &str, value: StaticValue) {
        self.globals.insert(name.to_string(), value);
        self.cache.clear();
    }

    pub fn field(&self, name: &str) -> Option<Field> {
        match self.globals.get(name) {
            Some(StaticValue::Field(field)) => Some(field.clone()),
            _ => None,
        }
    }

    /// Global fields, sorted by name.
    pub fn fields(&self) -> Vec<(String, Field)> {
        let mut fields: Vec<(String, Field)> = self
            .globals
            .iter()
            .filter_map(|(name, v)| match v {
                StaticValue::Field(f) => Some((name.clone(), f.clone())),
                _ => None,
            })
            .collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        fields
    }

    pub fn kernel_names(&self) -> Vec<String> {
        self.registry.kernel_names()
    }

    pub fn kernel_arity(&self, name: &str) -> Option<usize> {
        self.registry.get(name).filter(|d| d.role == FunctionRole::Kernel).map(|d| d.params.len())
    }

    pub fn compiled_kernel_count(&self) -> usize {
        self.cache.len()
    }

    /// Cached specializations of kernel `name`, ordered by signature.
    pub fn kernel_ir(&self, name: &str) -> Vec<Arc<KernelIr>> {
        let mut found: Vec<(&Signature, &Arc<KernelIr>)> =
            self.cache.iter().filter(|((n, _), _)| n == name).map(|((_, sig), ir)| (sig, ir)).collect();
        found.sort_by(|a, b| a.0.cmp(b.0));
        found.into_iter().map(|(_, ir)| ir.clone()).collect()
    }

    fn kernel(&self, name: &str) -> Result<Arc<FunctionDescriptor>, Box<dyn TilangErrorExt>> {
        let Some(desc) = self.registry.get(name) else {
            return Err(program_error(DiagnosticKind::UndefinedName, format!("Kernel '{}' is not defined", name), None));
        };
        if desc.role != FunctionRole::Kernel {
            return Err(program_error(
                DiagnosticKind::InvalidCall,
                format!("'{}' is a {}, not a kernel", name, desc.role),
                Some(&desc),
            ));
        }
        Ok(desc)
    }

    fn resolve_arg(&self, arg: &KernelArg, desc: &FunctionDescriptor) -> Result<KernelArg, Box<dyn TilangErrorExt>> {
        let KernelArg::Global(name) = arg else {
            return Ok(arg.clone());
        };
        match self.globals.get(name) {
            Some(StaticValue::Int(i)) => Ok(KernelArg::Int(*i)),
            Some(StaticValue::Bool(b)) => Ok(KernelArg::Int(*b as i64)),
            Some(StaticValue::Float(f)) => Ok(KernelArg::Float(*f)),
            Some(StaticValue::Field(f)) => Ok(KernelArg::Field(f.clone())),
            Some(other) => Ok(KernelArg::Template(other.clone())),
            None => Err(program_error(
                DiagnosticKind::UndefinedName,
                format!("Global '{}' is not defined", name),
                Some(desc),
            )),
        }
    }

    /// Splits host arguments into the compile-time signature and the
    /// runtime argument list.
    fn bind_args(
        &self,
        desc: &FunctionDescriptor,
        args: &[KernelArg],
    ) -> Result<(Vec<ArgSpec>, Vec<RuntimeArg>), Box<dyn TilangErrorExt>> {
        if args.len() != desc.params.len() {
            return Err(program_error(
                DiagnosticKind::InvalidCall,
                format!("Kernel '{}' takes {} argument(s) but {} were given", desc.name, desc.params.len(), args.len()),
                Some(desc),
            ));
        }
        let mut specs = Vec::with_capacity(args.len());
        let mut runtime = Vec::new();
        for (param, arg) in desc.params.iter().zip(args) {
            let arg = self.resolve_arg(arg, desc)?;
            let spec = match (&param.kind, arg) {
                (ParamKind::Scalar(dtype), KernelArg::Int(i)) => {
                    runtime.push(RuntimeArg::Scalar(Value::Int(i).cast(*dtype)));
                    ArgSpec::Scalar
                }
                (ParamKind::Scalar(dtype), KernelArg::Float(f)) => {
                    runtime.push(RuntimeArg::Scalar(Value::Float(f).cast(*dtype)));
                    ArgSpec::Scalar
                }
                (ParamKind::Template, KernelArg::Int(i)) => ArgSpec::Template(StaticValue::Int(i)),
                (ParamKind::Template, KernelArg::Float(f)) => ArgSpec::Template(StaticValue::Float(f)),
                (ParamKind::Template, KernelArg::Field(field)) => ArgSpec::Template(StaticValue::Field(field)),
                (ParamKind::Template, KernelArg::Template(value)) => ArgSpec::Template(value),
                (ParamKind::ExternalArray { .. }, KernelArg::NdArray(array)) => {
                    let spec = ArgSpec::NdArray {
                        dtype: array.dtype(),
                        ndim: array.ndim(),
                        element_shape: array.element_shape().to_vec(),
                        layout: array.layout(),
                    };
                    runtime.push(RuntimeArg::NdArray(array));
                    spec
                }
                (ParamKind::SparseMatrixBuilder, KernelArg::SparseBuilder(builder)) => {
                    runtime.push(RuntimeArg::SparseBuilder(builder));
                    ArgSpec::SparseBuilder
                }
                (kind, arg) => {
                    return Err(program_error(
                        DiagnosticKind::InvalidArgument,
                        format!("Argument '{}' of kernel '{}' expects {:?}, got {:?}", param.name, desc.name, kind, arg),
                        Some(desc),
                    ));
                }
            };
            specs.push(spec);
        }
        Ok((specs, runtime))
    }

    fn specialize(&mut self, desc: &FunctionDescriptor, specs: &[ArgSpec]) -> Result<Arc<KernelIr>, Box<dyn TilangErrorExt>> {
        let signature: Signature = specs.iter().map(ArgSpec::cache_key).collect();
        let key = (desc.name.clone(), signature);
        if let Some(ir) = self.cache.get(&key) {
            log::trace!("[program] cache hit for {}({})", desc.name, key.1.join(", "));
            return Ok(ir.clone());
        }
        log::info!("[program] compiling {}({})", desc.name, key.1.join(", "));
        let ir = Arc::new(lower_kernel(desc, specs, &self.config, &self.registry, &self.globals)?);
        self.cache.insert(key, ir.clone());
        Ok(ir)
    }

    /// Lowers (or fetches from the cache) the specialization of `name` for
    /// `args` without running it.
    pub fn compile(&mut self, name: &str, args: &[KernelArg]) -> Result<Arc<KernelIr>, Box<dyn TilangErrorExt>> {
        let desc = self.kernel(name)?;
        let (specs, _) = self.bind_args(&desc, args)?;
        self.specialize(&desc, &specs)
    }

    /// Runs kernel `name`; returns its value when it declares a return type.
    pub fn call(&mut self, name: &str, args: &[KernelArg]) -> Result<Option<Value>, Box<dyn TilangErrorExt>> {
        let desc = self.kernel(name)?;
        let (specs, runtime) = self.bind_args(&desc, args)?;
        let ir = self.specialize(&desc, &specs)?;
        let result = run_kernel(&ir, &runtime, self.sink.as_ref(), self.config.trace_execution)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_values_convert_into_kernel_args() {
        assert!(matches!(KernelArg::from(3i64), KernelArg::Int(3)));
        assert!(matches!(KernelArg::from(0.5f64), KernelArg::Float(f) if f == 0.5));
    }

    #[test]
    fn unknown_kernels_are_reported() {
        let mut program = Program::new(CompileConfig::default());
        let err = program.call("missing", &[]).unwrap_err();
        assert_eq!(err.message(), "Kernel 'missing' is not defined");
        assert_eq!(err.kind(), Some(DiagnosticKind::UndefinedName));
    }
}
