use ndarray::{array, Array1, Array4, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::tempdir;
use crate::error::DqnError;
use crate::loss::HuberLoss;
use crate::network::{argmax_rows, max_rows, NetworkConfig, QNetwork, PIXEL_SCALE};
use crate::optimizer::Adam;

fn small_config() -> NetworkConfig {
    NetworkConfig { in_channels: 4, height: 36, width: 36, num_actions: 3 }
}

fn small_network(seed: u64) -> QNetwork {
    let mut rng = StdRng::seed_from_u64(seed);
    QNetwork::new(small_config(), &mut rng).unwrap()
}

fn observations(batch: usize, seed: u64) -> Array4<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let pixels = crate::layers::WeightInit::FanInUniform.initialize((batch, 4, 36, 36), 1, &mut rng);
    pixels.mapv(|v: f32| ((v + 1.0) * 127.5).round())
}

#[test]
fn test_flatten_sizes() {
    assert_eq!(NetworkConfig::atari(4).flatten_size().unwrap(), 3136);
    assert_eq!(small_config().flatten_size().unwrap(), 64);
}

#[test]
fn test_network_creation() {
    let network = small_network(0);
    assert_eq!(network.conv1.kernels.dim(), (32, 4, 8, 8));
    assert_eq!(network.conv2.kernels.dim(), (64, 32, 4, 4));
    assert_eq!(network.conv3.kernels.dim(), (64, 64, 3, 3));
    assert_eq!(network.fc.weights.dim(), (64, 512));
    assert_eq!(network.head.weights.dim(), (512, 3));
    assert_eq!(network.parameters().len(), 10);
}

#[test]
fn test_evaluate_shape() {
    let network = small_network(1);
    let q_values = network.evaluate(observations(2, 2).view()).unwrap();
    assert_eq!(q_values.dim(), (2, 3));
    assert!(q_values.iter().all(|v| v.is_finite()));
}

#[test]
fn test_evaluate_scales_pixels() {
    let network = small_network(3);
    let obs = observations(1, 4);

    let scaled = obs.mapv(|v| v / PIXEL_SCALE);
    let x = network.conv1.forward_batch(scaled.view()).unwrap();
    let x = network.conv2.forward_batch(x.view()).unwrap();
    let x = network.conv3.forward_batch(x.view()).unwrap();
    let x = x.into_shape((1, 64)).unwrap();
    let x = network.fc.forward_batch(x.view()).unwrap();
    let expected = network.head.forward_batch(x.view()).unwrap();

    let actual = network.evaluate(obs.view()).unwrap();
    for (a, e) in actual.iter().zip(expected.iter()) {
        assert!((a - e).abs() < 1e-5);
    }
}

#[test]
fn test_evaluate_is_pure() {
    let network = small_network(5);
    let obs = observations(2, 6);
    let first = network.evaluate(obs.view()).unwrap();
    let second = network.evaluate(obs.view()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_evaluate_rejects_wrong_shape() {
    let network = small_network(0);
    let obs = Array4::<f32>::zeros((1, 3, 36, 36));
    assert!(matches!(network.evaluate(obs.view()), Err(DqnError::DimensionMismatch { .. })));
}

#[test]
fn test_load_parameters_copies_everything() {
    let source = small_network(10);
    let mut destination = small_network(11);
    assert_ne!(source.parameters(), destination.parameters());

    destination.load_parameters(&source.parameters()).unwrap();
    assert_eq!(source.parameters(), destination.parameters());

    let obs = observations(1, 12);
    assert_eq!(source.evaluate(obs.view()).unwrap(), destination.evaluate(obs.view()).unwrap());
}

#[test]
fn test_load_parameters_rejects_wrong_shape_without_changes() {
    let mut network = small_network(0);
    let before = network.parameters();

    let mut params = small_network(1).parameters();
    params.insert("head.bias".to_string(), Array1::<f32>::zeros(7).into_dyn());

    assert!(network.load_parameters(&params).is_err());
    assert_eq!(network.parameters(), before);
}

#[test]
fn test_head_bias_gradient_in_linear_huber_region() {
    let network = small_network(20);
    let obs = observations(4, 21);
    let actions = [1, 0, 1, 2];
    // Targets far above every prediction, so each residual is clipped to -1
    let targets = Array1::from_elem(4, 50.0);

    let (loss, gradients) = network
        .loss_and_gradients(obs.view(), &actions, targets.view(), &HuberLoss::default())
        .unwrap();

    assert!(loss > 40.0);
    let head_bias = &gradients["head.bias"];
    let expected = array![-0.25f32, -0.5, -0.25].into_dyn();
    for (g, e) in head_bias.iter().zip(expected.iter()) {
        assert!((g - e).abs() < 1e-6, "{} vs {}", g, e);
    }
    for (name, param) in network.parameters() {
        assert_eq!(gradients[&name].shape(), param.shape(), "{}", name);
    }
}

#[test]
fn test_loss_and_gradients_rejects_invalid_action() {
    let network = small_network(0);
    let obs = observations(2, 1);
    let targets = Array1::zeros(2);
    let result = network.loss_and_gradients(obs.view(), &[0, 3], targets.view(), &HuberLoss::default());
    assert!(matches!(result, Err(DqnError::InvalidAction { action: 3, max_actions: 3 })));
}

#[test]
fn test_apply_gradients_reduces_loss() {
    let mut network = small_network(30);
    let mut adam = Adam::default();
    let obs = observations(4, 31);
    let actions = [0, 1, 2, 0];
    let targets = array![1.0f32, -1.0, 0.5, 1.0];
    let loss_fn = HuberLoss::default();

    let (initial, _) = network.loss_and_gradients(obs.view(), &actions, targets.view(), &loss_fn).unwrap();
    for _ in 0..20 {
        let (_, gradients) = network.loss_and_gradients(obs.view(), &actions, targets.view(), &loss_fn).unwrap();
        network.apply_gradients(&gradients, &mut adam, 1e-3).unwrap();
    }
    let (trained, _) = network.loss_and_gradients(obs.view(), &actions, targets.view(), &loss_fn).unwrap();

    assert!(trained < initial, "{} should be below {}", trained, initial);
    assert_eq!(adam.t, 20);
}

#[test]
fn test_apply_gradients_requires_every_gradient() {
    let mut network = small_network(0);
    let mut gradients = network.parameters();
    gradients.remove("conv2.weight");
    let result = network.apply_gradients(&gradients, &mut Adam::default(), 1e-3);
    assert!(matches!(result, Err(DqnError::TrainingError(_))));
}

#[test]
fn test_save_and_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("network.bin");
    let network = small_network(40);
    network.save(&path).unwrap();

    let loaded = QNetwork::load(&path).unwrap();
    assert_eq!(loaded.config, network.config);
    let obs = observations(1, 41);
    assert_eq!(loaded.evaluate(obs.view()).unwrap(), network.evaluate(obs.view()).unwrap());
}

#[test]
fn test_argmax_and_max_rows() {
    let values = array![[1.0f32, 3.0, 3.0], [-1.0, -2.0, -0.5]];
    assert_eq!(argmax_rows(values.view()), vec![1, 2]);
    assert_eq!(max_rows(values.view()), array![3.0f32, -0.5]);
    assert_eq!(values.len_of(Axis(0)), 2);
}
