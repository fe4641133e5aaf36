mod ase_hrl_run;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config_path = std::env::args().nth(1);
    if let Err(e) = ase_hrl_run::train_network(config_path.as_deref()) {
        log::error!("training failed: {}", e);
        std::process::exit(1);
    }
}
