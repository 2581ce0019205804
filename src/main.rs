//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use log::{error, info};

use x17graph::device::CPUDevice;
use x17graph::dtype::DType;
use x17graph::ops::UnaryKind;
use x17graph::{ErrPack, Graph, GraphError};

//--------------------------------------------------------------------------------------------------

fn build(graph: &mut Graph) -> Result<(), ErrPack<GraphError>> {
	// y = relu(transpose(transpose(x^T @ w)))
	let x = graph.add_tensor(&[8, 64, 32], DType::F32);
	let w = graph.add_tensor(&[64, 16], DType::F32);
	let xt = graph.add_transpose(x, &[0, 2, 1])?;
	let h = graph.add_matmul(xt, w, false, false)?;
	let ht = graph.add_transpose(h, &[2, 0, 1])?;
	let h2 = graph.add_transpose(ht, &[1, 2, 0])?;
	let y = graph.add_unary(UnaryKind::Relu, h2)?;
	graph.mark_output(y);
	Ok(())
}

fn run(graph: &mut Graph) -> Result<(), ErrPack<GraphError>> {
	build(graph)?;
	info!(
		"built: {} operators, {} tensors",
		graph.operators().len(),
		graph.tensors().len()
	);

	graph.optimize();
	graph.infer_shapes()?;
	graph.plan_memory()?;

	for &op in graph.operators() {
		let data = graph.operator(op);
		info!("{:?} {:?}: {:?} -> {:?}", data.guid(), data.kind(), data.inputs(), data.outputs());
	}
	for &t in graph.tensors() {
		let tensor = graph.tensor(t);
		if let Some(blob) = tensor.blob() {
			info!(
				"{:?} {:?} {} {:?} at offset {}",
				tensor.guid(),
				tensor.shape(),
				tensor.dtype(),
				tensor.fuid(),
				blob.offset
			);
		}
	}
	Ok(())
}

fn main() {
	if let Err(e) = stderrlog::new().module(module_path!()).verbosity(2).init() {
		eprintln!("cannot initialize logging: {e}");
	}

	let mut graph = Graph::new(CPUDevice::new());
	if let Err(e) = run(&mut graph) {
		error!("{e}");
		std::process::exit(1);
	}
	if !graph.check_valid() {
		std::process::exit(1);
	}
}

//--------------------------------------------------------------------------------------------------
