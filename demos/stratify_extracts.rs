use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    panning::apps::run_stratify(std::env::args().skip(1))
}
