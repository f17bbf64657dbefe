use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    dataset_batch::cli::run_batch_cli(std::env::args().skip(1))
}
