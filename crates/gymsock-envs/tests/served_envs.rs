//! Built-in environments and wrappers driven through a real server.

use std::sync::Arc;
use std::thread;

use gymsock_core::space::Space;
use gymsock_core::traits::Hooks;
use gymsock_core::value::{Dtype, Value};
use gymsock_envs::grid::IMAGE_SIZE;
use gymsock_envs::wrappers::TRUNCATED_KEY;
use gymsock_envs::{CartPole, Registry, WrapperExtension};
use gymsock_server::{GymClient, GymServer};
use gymsock_test_utils::{AcceptingMonitor, seeded_rng};
use proptest::prelude::*;
use serde_json::json;

fn serve(connections: usize) -> (std::net::SocketAddr, thread::JoinHandle<()>) {
    let hooks = Hooks::new(AcceptingMonitor::default()).with_extension(WrapperExtension);
    let server = GymServer::bind("127.0.0.1:0", Arc::new(Registry::builtin()), hooks)
        .unwrap()
        .with_seed(Some(1));
    let addr = server.local_addr().unwrap();
    let handle = thread::spawn(move || server.serve_n(connections).unwrap());
    (addr, handle)
}

#[test]
fn grid_observations_use_binary_path() {
    let (addr, server) = serve(1);
    let mut client = GymClient::connect(addr, "GridPixels-v0").unwrap();

    let obs = client.reset().unwrap();
    let tensor = obs.as_tensor().unwrap();
    assert_eq!(tensor.dtype(), Dtype::Uint8);
    assert_eq!(tensor.shape(), &[IMAGE_SIZE, IMAGE_SIZE, 3]);

    client
        .wrap("CropObservations", &json!({"height": 4, "width": 4}))
        .unwrap();
    let Space::Box(space) = &client.spaces().unwrap().observation else {
        panic!("expected a Box observation space");
    };
    assert_eq!(space.shape(), &[4, 4, 3]);
    let reply = client.step(&json!(1)).unwrap();
    assert_eq!(reply.observation.as_tensor().unwrap().shape(), &[4, 4, 3]);

    drop(client);
    server.join().unwrap();
}

#[test]
fn configure_moves_images_to_json_path() {
    let (addr, server) = serve(1);
    let mut client = GymClient::connect(addr, "GridPixels-v0").unwrap();

    client.configure(&json!({"goal_reward": 3.0})).unwrap();
    let obs = client.reset().unwrap();
    assert_eq!(obs.as_tensor().unwrap().dtype(), Dtype::Float64);

    let err = client.configure(&json!({"goal_reward": 1, "speed": 2})).unwrap_err();
    assert!(err.to_string().contains("unknown field `speed`"));

    drop(client);
    server.join().unwrap();
}

#[test]
fn time_limit_wrapper_truncates_cartpole() {
    let (addr, server) = serve(1);
    let mut client = GymClient::connect(addr, "CartPole-v0").unwrap();
    client
        .wrap("TimeLimit", &json!({"max_episode_steps": 3}))
        .unwrap();

    client.reset().unwrap();
    let mut last = None;
    for action in [0, 1, 0] {
        last = Some(client.step(&json!(action)).unwrap());
    }
    let last = last.unwrap();
    assert!(last.done);
    assert_eq!(last.info[TRUNCATED_KEY], json!(true));

    let err = client.wrap("Blur", &json!({})).unwrap_err();
    assert_eq!(err.to_string(), "server error: unknown wrapper: Blur");

    drop(client);
    server.join().unwrap();
}

proptest! {
    #[test]
    fn cartpole_observations_stay_in_space(
        seed in any::<u64>(),
        actions in proptest::collection::vec(0u64..2, 1..300),
    ) {
        use gymsock_core::traits::Environment;

        let mut env = CartPole::new(seeded_rng(seed)).unwrap();
        let obs = env.reset().unwrap();
        prop_assert!(env.observation_space().contains(&obs));
        for action in actions {
            let result = env.step(Value::Discrete(action)).unwrap();
            prop_assert!(env.observation_space().contains(&result.observation));
            if result.done {
                break;
            }
        }
    }
}
