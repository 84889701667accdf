use backprop::{Network, NetworkConfig, Verbosity};
use ndarray::arr2;

// Usage: cargo run --example and_gate [config.json]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = match std::env::args().nth(1) {
        Some(path) => NetworkConfig::from_json_file(path)?,
        None => NetworkConfig::new(2, 4, 1)
            .epochs(500)
            .batch_size(4)
            .learning_rate(0.1)
            .clip_grad_l2(1.0)
            .verbosity(Verbosity::Progress),
    };

    let x = arr2(&[[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]]);
    let y = arr2(&[[0.0], [0.0], [0.0], [1.0]]);
    let x_valid = arr2(&[[0.1, 0.1], [0.9, 0.9]]);
    let y_valid = arr2(&[[0.0], [1.0]]);

    let mut network = Network::new(&config)?;
    let history = network.train(x.view(), y.view(), Some((x_valid.view(), y_valid.view())))?;

    if let (Some(first), Some(last)) = (history.train.first(), history.train.last()) {
        println!("training loss: {} -> {}", first, last);
    }
    println!("prediction:\n{}", network.predict(x.view())?);
    Ok(())
}
