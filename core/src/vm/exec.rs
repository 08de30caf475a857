//! file: core/src/vm/exec.rs
//! description: reference executor for `KernelIr`.
//!
//! A sequential register machine. `StructFor`/`RangeFor` run their body
//! range once per iteration by re-entering `exec_range`; branches jump to
//! patched op indices inside the current range.
//!
use crate::ir::eval::{eval_binary, eval_unary};
use crate::ir::module::KernelIr;
use crate::ir::op::{GlobalRef, IROp, PrintPart, Register};
use crate::ir::value::Value;
use crate::vm::err::RuntimeError;
use crate::vm::field::for_each_index;
use crate::vm::sink::PrintSink;
use crate::vm::value::RuntimeArg;

const ISSUER: &str = "tilang.vm.exec";

enum Flow {
    Done,
    /// A bare `return` in a kernel; stops every enclosing loop.
    Halt,
    Return(Value),
}

pub struct ExecState<'a> {
    ir: &'a KernelIr,
    args: &'a [RuntimeArg],
    regs: Vec<Value>,
    locals: Vec<Value>,
    sink: &'a dyn PrintSink,
    trace: bool,
    steps: usize,
}

impl<'a> ExecState<'a> {
    pub fn new(
        ir: &'a KernelIr,
        args: &'a [RuntimeArg],
        sink: &'a dyn PrintSink,
        trace: bool,
    ) -> Result<Self, RuntimeError> {
        if args.len() != ir.args.len() {
            return Err(RuntimeError::new(
                format!("kernel '{}' expects {} runtime argument(s), got {}", ir.name, ir.args.len(), args.len()),
                ISSUER,
            ));
        }
        for (i, (arg, slot)) in args.iter().zip(&ir.args).enumerate() {
            if !arg.matches(slot) {
                return Err(RuntimeError::new(
                    format!("runtime argument {} of kernel '{}' does not match {:?}", i, ir.name, slot),
                    ISSUER,
                ));
            }
        }
        Ok(ExecState {
            ir,
            args,
            regs: vec![Value::Int(0); ir.register_count()],
            locals: ir.locals.iter().map(|t| Value::zero(*t)).collect(),
            sink,
            trace,
            steps: 0,
        })
    }

    /// Executes the kernel body; returns the value of the first `Ret` reached.
    pub fn run(&mut self) -> Result<Option<Value>, RuntimeError> {
        let result = match self.exec_range(0, self.ir.ops.len())? {
            Flow::Return(v) => Some(v),
            Flow::Done | Flow::Halt => None,
        };
        log::trace!("[vm] {} finished after {} steps", self.ir.name, self.steps);
        Ok(result)
    }

    fn indices(&self, regs: &[Register]) -> Vec<i64> {
        regs.iter().map(|r| self.regs[*r].as_i64()).collect()
    }

    fn ndarray(&self, index: usize) -> Result<&'a crate::vm::field::NdArray, RuntimeError> {
        let args: &'a [RuntimeArg] = self.args;
        match args.get(index) {
            Some(RuntimeArg::NdArray(a)) => Ok(a),
            _ => Err(RuntimeError::new(format!("argument {} is not an external array", index), ISSUER)),
        }
    }

    fn global_shape(&self, target: GlobalRef) -> Result<Vec<usize>, RuntimeError> {
        match target {
            GlobalRef::Field(i) => Ok(self.ir.fields[i].shape().to_vec()),
            GlobalRef::Arg(i) => Ok(self.ndarray(i)?.shape().to_vec()),
        }
    }

    fn exec_range(&mut self, start: usize, end: usize) -> Result<Flow, RuntimeError> {
        let ir: &'a KernelIr = self.ir;
        let mut pc = start;
        while pc < end {
            let op = &ir.ops[pc];
            self.steps += 1;
            if self.trace {
                log::trace!("[vm] {:04}: {}", pc, op);
            }
            pc = match op {
                IROp::LConst { dest, value } => {
                    self.regs[*dest] = *value;
                    pc + 1
                }
                IROp::LArg { dest, index } => {
                    match self.args.get(*index) {
                        Some(RuntimeArg::Scalar(v)) => self.regs[*dest] = *v,
                        _ => {
                            return Err(RuntimeError::new(format!("argument {} is not a scalar", index), ISSUER));
                        }
                    }
                    pc + 1
                }
                IROp::LLocal { dest, local_index } => {
                    self.regs[*dest] = self.locals[*local_index];
                    pc + 1
                }
                IROp::SLocal { src, local_index } => {
                    self.locals[*local_index] = self.regs[*src].cast(ir.locals[*local_index]);
                    pc + 1
                }
                IROp::Binary { op, dest, src1, src2, dtype } => {
                    let v = eval_binary(*op, self.regs[*src1], self.regs[*src2], *dtype)
                        .map_err(|m| RuntimeError::new(m, ISSUER))?;
                    self.regs[*dest] = v;
                    pc + 1
                }
                IROp::Unary { op, dest, src, dtype } => {
                    let v = eval_unary(*op, self.regs[*src], *dtype).map_err(|m| RuntimeError::new(m, ISSUER))?;
                    self.regs[*dest] = v;
                    pc + 1
                }
                IROp::Cast { dest, src, to } => {
                    self.regs[*dest] = self.regs[*src].cast(*to);
                    pc + 1
                }
                IROp::Select { dest, cond, on_true, on_false } => {
                    let pick = if self.regs[*cond].is_truthy() { *on_true } else { *on_false };
                    self.regs[*dest] = self.regs[pick];
                    pc + 1
                }
                IROp::GLoad { dest, target, indices, element } => {
                    let idx = self.indices(indices);
                    self.regs[*dest] = match target {
                        GlobalRef::Field(i) => ir.fields[*i].get(&idx)?,
                        GlobalRef::Arg(i) => self.ndarray(*i)?.get(&idx, *element)?,
                    };
                    pc + 1
                }
                IROp::GStore { src, target, indices, element } => {
                    let idx = self.indices(indices);
                    let value = self.regs[*src];
                    match target {
                        GlobalRef::Field(i) => ir.fields[*i].set(&idx, value)?,
                        GlobalRef::Arg(i) => self.ndarray(*i)?.set(&idx, *element, value)?,
                    }
                    pc + 1
                }
                IROp::SparseAdd { arg, row, col, src } => {
                    let builder = match self.args.get(*arg) {
                        Some(RuntimeArg::SparseBuilder(b)) => b,
                        _ => {
                            return Err(RuntimeError::new(
                                format!("argument {} is not a sparse matrix builder", arg),
                                ISSUER,
                            ));
                        }
                    };
                    builder.add(self.regs[*row].as_i64(), self.regs[*col].as_i64(), self.regs[*src].as_f64())?;
                    pc + 1
                }
                IROp::Label { .. } | IROp::EndFor => pc + 1,
                IROp::Jump { target } => *target,
                IROp::BrTrue { cond, target } => {
                    if self.regs[*cond].is_truthy() { *target } else { pc + 1 }
                }
                IROp::BrFalse { cond, target } => {
                    if self.regs[*cond].is_truthy() { pc + 1 } else { *target }
                }
                IROp::StructFor { target, index_locals, end } => {
                    let shape = self.global_shape(*target)?;
                    let mut stopped = None;
                    for_each_index(&shape, |idx| {
                        for (local, i) in index_locals.iter().zip(idx) {
                            self.locals[*local] = Value::Int(*i);
                        }
                        match self.exec_range(pc + 1, *end)? {
                            Flow::Done => Ok(true),
                            flow => {
                                stopped = Some(flow);
                                Ok(false)
                            }
                        }
                    })?;
                    if let Some(flow) = stopped {
                        return Ok(flow);
                    }
                    end + 1
                }
                IROp::RangeFor { local, begin, end_reg, end } => {
                    let (b, e) = (self.regs[*begin].as_i64(), self.regs[*end_reg].as_i64());
                    for i in b..e {
                        self.locals[*local] = Value::Int(i).cast(ir.locals[*local]);
                        match self.exec_range(pc + 1, *end)? {
                            Flow::Done => {}
                            flow => return Ok(flow),
                        }
                    }
                    end + 1
                }
                IROp::Print { parts } => {
                    let mut line = String::new();
                    for part in parts {
                        match part {
                            PrintPart::Literal(s) => line.push_str(s),
                            PrintPart::Value { reg, dtype } => line.push_str(&self.regs[*reg].render(*dtype)),
                        }
                    }
                    self.sink.print(&line);
                    pc + 1
                }
                IROp::Ret { src } => return Ok(Flow::Return(self.regs[*src])),
                IROp::Halt => return Ok(Flow::Halt),
            };
        }
        Ok(Flow::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::op::BinOp;
    use crate::ir::value::DataType;
    use crate::vm::sink::BufferSink;

    #[test]
    fn range_for_accumulates_into_local() {
        let mut ir = KernelIr::new("sum");
        let acc = ir.alloc_local(DataType::I32);
        let i = ir.alloc_local(DataType::I32);
        ir.emit_op(IROp::LConst { dest: 0, value: Value::Int(0) });
        ir.emit_op(IROp::LConst { dest: 1, value: Value::Int(5) });
        let header = ir.emit_op(IROp::RangeFor { local: i, begin: 0, end_reg: 1, end: 0 });
        ir.emit_op(IROp::LLocal { dest: 2, local_index: acc });
        ir.emit_op(IROp::LLocal { dest: 3, local_index: i });
        ir.emit_op(IROp::Binary { op: BinOp::Add, dest: 4, src1: 2, src2: 3, dtype: DataType::I32 });
        ir.emit_op(IROp::SLocal { src: 4, local_index: acc });
        let end = ir.emit_op(IROp::EndFor);
        ir.patch_loop_end(header, end);
        ir.emit_op(IROp::LLocal { dest: 5, local_index: acc });
        ir.emit_op(IROp::Ret { src: 5 });
        for _ in 0..6 {
            ir.alloc_reg();
        }
        let sink = BufferSink::new();
        let mut state = ExecState::new(&ir, &[], &sink, false).unwrap();
        assert_eq!(state.run().unwrap(), Some(Value::Int(10)));
    }

    #[test]
    fn integer_modulo_by_zero_is_a_runtime_error() {
        let mut ir = KernelIr::new("bad");
        for _ in 0..3 {
            ir.alloc_reg();
        }
        ir.emit_op(IROp::LConst { dest: 0, value: Value::Int(1) });
        ir.emit_op(IROp::LConst { dest: 1, value: Value::Int(0) });
        ir.emit_op(IROp::Binary { op: BinOp::Mod, dest: 2, src1: 0, src2: 1, dtype: DataType::I32 });
        let sink = BufferSink::new();
        let mut state = ExecState::new(&ir, &[], &sink, false).unwrap();
        assert!(state.run().is_err());
    }
}
