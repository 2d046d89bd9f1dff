use blockcg::{BlockCgSolMgr, LinearProblem, MsgType, MultiVec, ParameterList, laplacian_1d};
use rand::Rng;
use std::sync::Arc;

fn main() -> Result<(), blockcg::KError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let n = 200;
    let m = 6;
    let a = Arc::new(laplacian_1d::<f64>(n));
    let mut rng = rand::thread_rng();
    let b = MultiVec::from_fn(n, m, |_, _| rng.gen_range(-1.0..1.0));

    let mut problem = LinearProblem::new(a, MultiVec::zeros(n, m), b)?;
    problem.set_problem()?;

    let params = ParameterList::new()
        .with("Block Size", 4)
        .with("Convergence Tolerance", 1e-10)
        .with("Orthogonalization", "DGKS")
        .with("Verbosity", (MsgType::ERRORS | MsgType::WARNINGS | MsgType::FINAL_SUMMARY | MsgType::TIMING_DETAILS).bits() as i64);
    let mut solver = BlockCgSolMgr::from_params(&params)?;
    let status = solver.solve(&mut problem)?;

    println!("{}", solver.description());
    println!("status = {status:?}, iterations = {}, achieved tol = {:e}", solver.num_iters(), solver.achieved_tol());
    if let Some(report) = solver.last_report() {
        for block in &report.blocks {
            println!("block {:?}: active sizes {:?}, {} iterations", block.indices, block.active_sizes(), block.iterations);
        }
    }
    Ok(())
}
