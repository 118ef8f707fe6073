use hashvec_trainer::Pipeline;
use std::{env, process};
use tracing::error;

// usage: hashvec_trainer <config.json>
// the config names the data directory (dictionary, question-answer pairs,
// articles) and the output file, see config.rs for the optional keys.

fn main() {

    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    if let Err(e) = Pipeline::run(&args) {
        error!("{}", e);
        process::exit(1);
    }
}
