//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

#![allow(clippy::unwrap_used)]

use super::*;
use crate::device::CPUDevice;
use crate::device::counting::CountingDevice;
use crate::ops::OpType;

//--------------------------------------------------------------------------------------------------

fn new_graph() -> Graph {
	Graph::new(CPUDevice::new())
}

fn count_ops(g: &Graph, op_type: OpType) -> usize {
	g.operators().iter().filter(|&&op| g.operator(op).op_type() == op_type).count()
}

fn identity() -> OpKind {
	OpKind::Unary(UnaryKind::Identity)
}

//-- sorting

#[test]
fn test_sort_orders_by_dependency() {
	let mut g = new_graph();
	let x = g.add_tensor(&[4], DType::F32);
	let y = g.add_tensor(&[4], DType::F32);
	let z = g.add_tensor(&[4], DType::F32);

	// added in reverse
	let second = g.add_operator(identity(), &[y], &[z]).unwrap();
	let first = g.add_operator(identity(), &[x], &[y]).unwrap();
	assert_eq!(g.operators(), &[second, first]);
	assert!(!g.is_sorted());

	g.sort().unwrap();
	assert!(g.is_sorted());
	assert_eq!(g.operators(), &[first, second]);

	g.sort().unwrap();
	assert_eq!(g.operators(), &[first, second]);
	assert!(g.check_valid());
}

#[test]
fn test_sort_cycle() {
	let mut g = new_graph();
	let a = g.add_tensor(&[4], DType::F32);
	let b = g.add_tensor(&[4], DType::F32);
	let op1 = g.add_operator(identity(), &[b], &[a]).unwrap();
	let op2 = g.add_operator(identity(), &[a], &[b]).unwrap();

	let err = g.sort().unwrap_err();
	assert_eq!(err.code, GraphError::Cycle);
	assert!(!g.is_sorted());
	assert_eq!(g.operators(), &[op1, op2]);

	assert_eq!(g.infer_shapes().unwrap_err().code, GraphError::Cycle);
	assert_eq!(g.plan_memory().unwrap_err().code, GraphError::Cycle);
	assert!(!g.allocator().is_materialized());
}

#[test]
fn test_edges_are_derived() {
	let mut g = new_graph();
	let x = g.add_tensor(&[2, 2], DType::F32);
	let a = g.add_unary(UnaryKind::Exp, x).unwrap();
	let b = g.add_binary(BinaryKind::Mul, a, a).unwrap();

	let exp = g.tensor(a).producer().unwrap();
	let mul = g.tensor(b).producer().unwrap();
	assert_eq!(g.tensor(a).consumers(), &[mul]);
	assert_eq!(g.operator(mul).predecessors(), &[exp]);
	assert_eq!(g.operator(exp).successors(), &[mul]);
	assert!(g.operator(exp).predecessors().is_empty());
	assert!(g.check_valid());
}

#[test]
fn test_check_valid_reports_orphans() {
	let mut g = new_graph();
	let x = g.add_tensor(&[4], DType::F32);
	let stray = g.add_tensor(&[4], DType::F32);
	let y = g.add_unary(UnaryKind::Relu, x).unwrap();
	assert!(!g.check_valid());

	g.optimize();
	assert!(g.check_valid());
	assert!(g.tensor(stray).is_dead());
	assert!(!g.tensor(y).is_dead());
	assert_eq!(g.tensors(), &[x, y]);
}

//-- optimizer

#[test]
fn test_fuse_transpose_into_matmul_a() {
	let mut g = new_graph();
	let x = g.add_tensor(&[2, 4, 3], DType::F32);
	let a = g.add_transpose(x, &[0, 2, 1]).unwrap();
	let b = g.add_tensor(&[2, 4, 5], DType::F32);
	let c = g.add_matmul(a, b, false, false).unwrap();
	assert_eq!(g.tensor(c).shape(), &[2, 3, 5]);
	let transpose = g.tensor(a).producer().unwrap();

	g.optimize();
	assert!(g.operator(transpose).is_dead());
	assert!(g.check_valid());
	assert_eq!(g.operators().len(), 1);
	assert_eq!(count_ops(&g, OpType::Transpose), 0);

	let op = g.operators()[0];
	let matmul = g.operator(op).kind().as_matmul().unwrap();
	assert!(matmul.trans_a);
	assert!(!matmul.trans_b);
	assert_eq!(g.operator(op).inputs(), &[x, b]);
	assert_eq!(g.tensors(), &[x, b, c]);
	assert!(!g.is_live_tensor(a));

	g.infer_shapes().unwrap();
	assert_eq!(g.tensor(c).shape(), &[2, 3, 5]);
}

#[test]
fn test_fuse_transpose_into_matmul_b() {
	let mut g = new_graph();
	let a = g.add_tensor(&[3, 4], DType::F32);
	let y = g.add_tensor(&[5, 4], DType::F32);
	let b = g.add_transpose(y, &[1, 0]).unwrap();
	let c = g.add_matmul(a, b, false, false).unwrap();

	g.optimize();
	assert!(g.check_valid());
	assert_eq!(g.operators().len(), 1);

	let op = g.operators()[0];
	let matmul = g.operator(op).kind().as_matmul().unwrap();
	assert!(!matmul.trans_a);
	assert!(matmul.trans_b);
	assert_eq!(g.operator(op).inputs(), &[a, y]);

	g.infer_shapes().unwrap();
	assert_eq!(g.tensor(c).shape(), &[3, 5]);
}

#[test]
fn test_fuse_transpose_shared_by_both_inputs() {
	let mut g = new_graph();
	let x = g.add_tensor(&[4, 4], DType::F32);
	let t = g.add_transpose(x, &[1, 0]).unwrap();
	let c = g.add_matmul(t, t, false, false).unwrap();

	g.optimize();
	assert!(g.check_valid());
	assert_eq!(g.operators().len(), 1);

	let op = g.operators()[0];
	let matmul = g.operator(op).kind().as_matmul().unwrap();
	assert!(matmul.trans_a);
	assert!(matmul.trans_b);
	assert_eq!(g.operator(op).inputs(), &[x, x]);
	assert_eq!(g.tensor(x).consumers(), &[op]);
	assert_eq!(g.tensors(), &[x, c]);
}

#[test]
fn test_keep_transpose_of_other_axes() {
	let mut g = new_graph();
	let x = g.add_tensor(&[3, 2, 4], DType::F32);
	let a = g.add_transpose(x, &[1, 0, 2]).unwrap();
	let b = g.add_tensor(&[2, 4, 5], DType::F32);
	g.add_matmul(a, b, false, false).unwrap();

	g.optimize();
	assert!(g.check_valid());
	assert_eq!(count_ops(&g, OpType::Transpose), 1);
	assert_eq!(count_ops(&g, OpType::MatMul), 1);
}

#[test]
fn test_cancel_transpose_pair() {
	let mut g = new_graph();
	let x = g.add_tensor(&[2, 3, 4], DType::F32);
	let t1 = g.add_transpose(x, &[2, 0, 1]).unwrap();
	let t2 = g.add_transpose(t1, &[1, 2, 0]).unwrap();
	assert_eq!(g.tensor(t2).shape(), &[2, 3, 4]);
	let r = g.add_unary(UnaryKind::Relu, t2).unwrap();

	g.optimize();
	assert!(g.check_valid());
	assert_eq!(g.operators().len(), 1);
	assert_eq!(count_ops(&g, OpType::Transpose), 0);

	let relu = g.operators()[0];
	assert_eq!(g.operator(relu).inputs(), &[x]);
	assert!(g.operator(relu).predecessors().is_empty());
	assert_eq!(g.tensors(), &[x, r]);
}

#[test]
fn test_transpose_pair_feeding_output_is_kept() {
	let mut g = new_graph();
	let x = g.add_tensor(&[3, 4], DType::F32);
	let t1 = g.add_transpose(x, &[1, 0]).unwrap();
	let t2 = g.add_transpose(t1, &[1, 0]).unwrap();

	// t2 has no consumers to redirect, so there is nothing to rewrite
	g.optimize();
	assert!(g.check_valid());
	assert_eq!(count_ops(&g, OpType::Transpose), 2);
	assert_eq!(g.tensors(), &[x, t1, t2]);
}

#[test]
fn test_non_inverse_transposes_are_kept() {
	let mut g = new_graph();
	let x = g.add_tensor(&[2, 3, 4], DType::F32);
	let t1 = g.add_transpose(x, &[2, 0, 1]).unwrap();
	let t2 = g.add_transpose(t1, &[2, 0, 1]).unwrap();
	g.add_unary(UnaryKind::Neg, t2).unwrap();

	g.optimize();
	assert!(g.check_valid());
	assert_eq!(count_ops(&g, OpType::Transpose), 2);
	assert_eq!(g.operators().len(), 3);
}

#[test]
fn test_dead_code_elimination() {
	let mut g = new_graph();
	let x = g.add_tensor(&[4], DType::F32);
	let a = g.add_unary(UnaryKind::Relu, x).unwrap();
	let unused = g.add_unary(UnaryKind::Neg, x).unwrap();
	let unused2 = g.add_unary(UnaryKind::Sqrt, unused).unwrap();
	let b = g.add_unary(UnaryKind::Exp, a).unwrap();

	g.optimize();
	assert!(g.check_valid());
	assert_eq!(g.tensors(), &[x, a, b]);
	assert_eq!(g.operators().len(), 2);
	assert!(!g.is_live_tensor(unused));
	assert!(!g.is_live_tensor(unused2));
	assert_eq!(g.tensor(x).consumers().len(), 1);

	g.sort().unwrap();
	let ops = g.operators();
	assert_eq!(g.operator(ops[0]).op_type(), OpType::Unary);
	assert_eq!(g.operator(ops[1]).outputs(), &[b]);
}

#[test]
fn test_dead_code_keeps_marked_outputs() {
	let mut g = new_graph();
	let x = g.add_tensor(&[4], DType::F32);
	let a = g.add_unary(UnaryKind::Relu, x).unwrap();
	let b = g.add_unary(UnaryKind::Neg, x).unwrap();
	g.mark_output(a);

	// b is the last tensor but not a marked output
	g.optimize();
	assert!(g.check_valid());
	assert_eq!(g.tensors(), &[x, a]);
	assert!(!g.is_live_tensor(b));
	assert!(g.is_output(a));

	let mut g = new_graph();
	let x = g.add_tensor(&[4], DType::F32);
	let a = g.add_unary(UnaryKind::Relu, x).unwrap();
	let b = g.add_unary(UnaryKind::Neg, x).unwrap();
	g.mark_output(a);
	g.mark_output(b);
	g.optimize();
	assert_eq!(g.tensors(), &[x, a, b]);
	assert_eq!(g.operators().len(), 2);
}

#[test]
fn test_optimize_is_stable() {
	let mut g = new_graph();
	let x = g.add_tensor(&[2, 4, 3], DType::F32);
	let t = g.add_transpose(x, &[0, 2, 1]).unwrap();
	let y = g.add_tensor(&[2, 4, 5], DType::F32);
	let c = g.add_matmul(t, y, false, false).unwrap();
	let c1 = g.add_transpose(c, &[0, 2, 1]).unwrap();
	let c2 = g.add_transpose(c1, &[0, 2, 1]).unwrap();
	g.add_unary(UnaryKind::Relu, c2).unwrap();

	g.optimize();
	assert!(g.check_valid());
	let tensors = g.tensors().to_vec();
	let ops = g.operators().to_vec();
	assert_eq!(count_ops(&g, OpType::Transpose), 0);
	assert_eq!(ops.len(), 2);
	assert_eq!(g.operator(ops[0]).successors(), &[ops[1]]);
	assert_eq!(g.operator(ops[1]).predecessors(), &[ops[0]]);
	assert_eq!(g.operator(ops[1]).inputs(), &[c]);

	g.optimize();
	assert_eq!(g.tensors(), tensors.as_slice());
	assert_eq!(g.operators(), ops.as_slice());
}

//-- shape inference

#[test]
fn test_infer_shapes() {
	let mut g = new_graph();
	let a = g.add_tensor(&[2, 3, 4], DType::F32);
	let b = g.add_tensor(&[2, 4, 5], DType::F32);
	let c = g.add_tensor(&[1], DType::F32);
	g.add_operator(OpKind::MatMul(MatMul::default()), &[a, b], &[c]).unwrap();
	let d = g.add_tensor(&[7], DType::F32);
	g.add_operator(OpKind::Transpose(Transpose::new(&[2, 0, 1])), &[c], &[d]).unwrap();

	g.infer_shapes().unwrap();
	assert!(g.is_sorted());
	assert_eq!(g.tensor(c).shape(), &[2, 3, 5]);
	assert_eq!(g.tensor(d).shape(), &[5, 2, 3]);
	assert_eq!(g.tensor(d).rank(), 3);
}

#[test]
fn test_infer_shapes_updates_all_copies() {
	let mut g = new_graph();
	let a = g.add_tensor(&[3, 4], DType::F32);
	let b = g.add_tensor(&[4, 6], DType::F32);
	let c = g.add_tensor(&[1, 1], DType::F32);
	g.add_operator(OpKind::MatMul(MatMul::default()), &[a, b], &[c]).unwrap();
	let copy = g.clone_tensor(c);

	assert_eq!(g.tensor(copy).fuid(), g.tensor(c).fuid());
	assert_ne!(g.tensor(copy).guid(), g.tensor(c).guid());
	assert_eq!(g.tensor_by_fuid(g.tensor(copy).fuid()), Some(c));

	g.infer_shapes().unwrap();
	assert_eq!(g.tensor(c).shape(), &[3, 6]);
	assert_eq!(g.tensor(copy).shape(), &[3, 6]);
}

#[test]
fn test_infer_shapes_contraction_mismatch() {
	let mut g = new_graph();
	let a = g.add_tensor(&[2, 3, 4], DType::F32);
	let b = g.add_tensor(&[2, 5, 5], DType::F32);

	let err = g.add_matmul(a, b, false, false).unwrap_err();
	assert_eq!(err.code, GraphError::ShapeInconsistency);

	let c = g.add_tensor(&[2, 3, 5], DType::F32);
	g.add_operator(OpKind::MatMul(MatMul::default()), &[a, b], &[c]).unwrap();
	let d = g.add_tensor(&[9], DType::F32);
	g.add_operator(OpKind::Unary(UnaryKind::Relu), &[c], &[d]).unwrap();

	let err = g.infer_shapes().unwrap_err();
	assert_eq!(err.code, GraphError::ShapeInconsistency);
	assert!(err.message().contains("MatMul"), "{err}");
	assert_eq!(g.tensor(c).shape(), &[2, 3, 5]);

	// operators after the failing one are not visited
	assert_eq!(g.tensor(d).shape(), &[9]);
}

//-- construction

#[test]
fn test_add_operator_validation() {
	let mut g = new_graph();
	let x = g.add_tensor(&[2, 3], DType::F32);
	let y = g.add_tensor(&[2, 3], DType::F32);
	let z = g.add_tensor(&[2, 3], DType::F32);

	let err = g.add_operator(identity(), &[x, y], &[z]).unwrap_err();
	assert_eq!(err.code, GraphError::InvalidOperator);

	let err = g.add_operator(OpKind::Transpose(Transpose::new(&[0, 0])), &[x], &[z]).unwrap_err();
	assert_eq!(err.code, GraphError::InvalidOperator);

	let err = g.add_operator(identity(), &[x], &[x]).unwrap_err();
	assert_eq!(err.code, GraphError::InvalidOperator);

	g.add_operator(identity(), &[x], &[z]).unwrap();
	let err = g.add_operator(identity(), &[y], &[z]).unwrap_err();
	assert_eq!(err.code, GraphError::InvalidOperator);

	let err = g.add_operator(identity(), &[TensorIndex::new(100)], &[y]).unwrap_err();
	assert_eq!(err.code, GraphError::InvalidOperator);

	// failed attempts leave no trace
	assert_eq!(g.operators().len(), 1);
	assert!(g.tensor(y).producer().is_none());
	assert_eq!(g.tensor(x).consumers().len(), 1);
}

#[test]
fn test_builders_infer_output() {
	let mut g = new_graph();
	let x = g.add_tensor(&[2, 1, 4], DType::F64);
	let y = g.add_tensor(&[3, 1], DType::F64);
	let s = g.add_binary(BinaryKind::Add, x, y).unwrap();
	assert_eq!(g.tensor(s).shape(), &[2, 3, 4]);
	assert_eq!(g.tensor(s).dtype(), DType::F64);

	let bad = g.add_tensor(&[5], DType::F64);
	let err = g.add_binary(BinaryKind::Sub, x, bad).unwrap_err();
	assert_eq!(err.code, GraphError::ShapeInconsistency);

	let err = g.add_transpose(x, &[1, 0]).unwrap_err();
	assert_eq!(err.code, GraphError::ShapeInconsistency);
}

//-- memory planning

fn planning_graph(device: Rc<dyn Device>) -> Graph {
	let mut g = Graph::new(device);
	let x = g.add_tensor(&[2, 3], DType::F32);
	g.add_tensor(&[3], DType::U8);
	let y = g.add_unary(UnaryKind::Relu, x).unwrap();
	let z = g.add_binary(BinaryKind::Add, x, y).unwrap();
	let e = g.add_tensor(&[0], DType::F32);
	g.add_unary(UnaryKind::Identity, e).unwrap();
	g.add_unary(UnaryKind::Sqrt, z).unwrap();
	g
}

fn offsets(g: &Graph) -> Vec<usize> {
	g.tensors().iter().map(|&t| g.tensor(t).blob().unwrap().offset).collect()
}

#[test]
fn test_plan_memory_layout() {
	let mut g = planning_graph(CPUDevice::new());
	g.plan_memory().unwrap();

	let alignment = g.allocator().alignment();
	let buffer = g.tensor(g.tensors()[0]).blob().unwrap().buffer;
	let mut ranges = Vec::new();
	for &t in g.tensors() {
		let blob = g.tensor(t).blob().unwrap();
		assert_eq!(blob.buffer, buffer);
		assert_eq!(blob.offset % alignment, 0);
		let end = blob.offset + g.allocator().aligned_size(g.tensor(t).bytes());
		assert!(end <= g.allocator().peak());
		ranges.push((blob.offset, end));
	}
	for (i, &(s1, e1)) in ranges.iter().enumerate() {
		for &(s2, e2) in &ranges[i + 1..] {
			assert!(e1 <= s2 || e2 <= s1, "[{s1}, {e1}) overlaps [{s2}, {e2})");
		}
	}

	// x: 24, m: 3 -> 8, y: 24, z: 24, e: 0 -> 8, w: 0 -> 8, sqrt: 24
	assert_eq!(offsets(&g), vec![0, 24, 32, 56, 80, 88, 96]);
	assert_eq!(g.allocator().peak(), 120);
}

#[test]
fn test_plan_memory_buffer_is_writable() {
	let dev = CPUDevice::new();
	let mut g = planning_graph(dev.clone());
	g.plan_memory().unwrap();

	let tensors = g.tensors().to_vec();
	for (i, &t) in tensors.iter().enumerate() {
		let blob = g.tensor(t).blob().unwrap();
		let bytes = g.tensor(t).bytes();
		unsafe {
			let data = dev.data_ptr(blob.buffer).add(blob.offset);
			std::ptr::write_bytes(data, i as u8 + 1, bytes);
		}
	}
	for (i, &t) in tensors.iter().enumerate() {
		let blob = g.tensor(t).blob().unwrap();
		let bytes = g.tensor(t).bytes();
		let data = unsafe {
			std::slice::from_raw_parts(dev.data_ptr(blob.buffer).add(blob.offset), bytes)
		};
		assert!(data.iter().all(|&b| b == i as u8 + 1), "tensor {i} was overwritten");
	}
}

#[test]
fn test_plan_memory_is_deterministic() {
	let mut g1 = planning_graph(CPUDevice::new());
	let mut g2 = planning_graph(CPUDevice::new());
	g1.plan_memory().unwrap();
	g2.plan_memory().unwrap();
	assert_eq!(offsets(&g1), offsets(&g2));
	assert_eq!(g1.allocator().peak(), g2.allocator().peak());

	let before = offsets(&g1);
	g1.plan_memory().unwrap();
	assert_eq!(offsets(&g1), before);
}

#[test]
fn test_plan_memory_allocates_once() {
	let dev = CountingDevice::new();
	{
		let mut g = planning_graph(dev.clone());
		g.plan_memory().unwrap();
		g.plan_memory().unwrap();
		assert_eq!(dev.allocs.get(), 1);
		assert_eq!(dev.last_bytes.get(), Some(g.allocator().peak()));
		assert_eq!(dev.deallocs.get(), 0);
	}
	assert_eq!(dev.deallocs.get(), 1);
}

#[test]
fn test_plan_memory_device_failure() {
	let dev = CountingDevice::new_failing();
	let mut g = planning_graph(dev.clone());
	let err = g.plan_memory().unwrap_err();
	assert_eq!(err.code, GraphError::DeviceAllocFailed);
	assert!(!g.allocator().is_materialized());
	assert_eq!(g.allocator().peak(), 0);
	assert_eq!(g.allocator().used(), 0);
	assert!(g.tensors().iter().all(|&t| g.tensor(t).blob().is_none()));
}

//--------------------------------------------------------------------------------------------------
