//! End-to-end runs over real loopback sockets. Each test uses its own port
//! range so they can run in parallel.

use std::net::IpAddr;
use std::time::Duration;

use synod::constants::PEERS;
use synod::{Config, Error, Network};

const DEADLINE: Duration = Duration::from_secs(20);

fn localhost() -> IpAddr {
    "127.0.0.1".parse().unwrap()
}

fn config(port: u16) -> Config {
    Config::new(port)
        .with_bind(localhost())
        .with_heartbeat(Duration::from_millis(20))
        .with_timeout(Duration::from_secs(10))
}

/// Starts four peers on `port..port + PEERS`, sorted by identity.
async fn start(port: u16) -> Vec<Network<String>> {
    let mut handles = vec![tokio::spawn(config(port).start::<String>())];
    for _ in 1..PEERS {
        let joiner = config(port).with_coordinator(localhost());
        handles.push(tokio::spawn(joiner.start::<String>()));
    }
    let mut networks = Vec::new();
    for handle in handles {
        networks.push(handle.await.unwrap().unwrap());
    }
    networks.sort_by_key(|network| network.id());
    networks
}

/// Polls every network until each has seen all of `commands`, returning
/// what each one saw.
async fn wait_for(networks: &[Network<String>], commands: &[&str]) -> Vec<Vec<String>> {
    let mut agreed = vec![Vec::new(); networks.len()];
    let waiting = async {
        loop {
            for (seen, network) in agreed.iter_mut().zip(networks) {
                seen.extend(network.poll_agreed());
            }
            let done = agreed.iter().all(|seen| {
                commands.iter().all(|command| seen.iter().any(|s| s == command))
            });
            if done {
                break
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(DEADLINE, waiting).await.expect("commands were agreed");
    agreed
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rendezvous_assigns_every_identity() {
    let port = 41_620;
    let mut handles = vec![tokio::spawn(async move { config(port).rendezvous().await })];
    for _ in 1..PEERS {
        handles.push(tokio::spawn(async move {
            config(port).with_coordinator(localhost()).rendezvous().await
        }));
    }
    let mut ids = Vec::new();
    for handle in handles {
        let mesh = handle.await.unwrap().unwrap();
        assert_eq!(mesh.links.len(), PEERS);
        assert_eq!(mesh.addresses.len(), PEERS);
        assert!(mesh.addresses.iter().all(|ip| *ip == localhost()));
        ids.push(mesh.id);
    }
    ids.sort();
    assert_eq!(ids, (0..PEERS).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_move_reaches_every_peer() {
    let networks = start(42_620).await;
    networks[2].broadcast("move 2 50 50 east".to_string());

    let agreed = wait_for(&networks, &["move 2 50 50 east"]).await;
    for seen in &agreed {
        assert_eq!(seen, &vec!["move 2 50 50 east".to_string()]);
    }
    assert!(networks.iter().all(|network| network.instance() >= 1));

    for network in networks {
        network.join().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_agreement_survives_closed_peer() {
    let mut networks = start(43_620).await;
    let closed = networks.pop().unwrap();
    assert_eq!(closed.id(), 3);
    closed.join().await;

    networks[0].broadcast("start 0".to_string());
    networks[1].broadcast("kill 1".to_string());
    let agreed = wait_for(&networks, &["start 0", "kill 1"]).await;
    assert_eq!(agreed[0], agreed[1]);
    assert_eq!(agreed[1], agreed[2]);

    for network in networks {
        network.join().await;
    }
}

#[tokio::test]
async fn test_missing_coordinator_times_out() {
    let result = Config::new(44_620)
        .with_coordinator(localhost())
        .with_timeout(Duration::from_millis(200))
        .rendezvous()
        .await;
    assert!(matches!(result, Err(Error::Timeout)));
}

#[tokio::test]
async fn test_incomplete_game_times_out() {
    let port = 45_620;
    let coordinator = tokio::spawn(async move {
        config(port).with_timeout(Duration::from_millis(300)).rendezvous().await
    });
    let joiner = config(port)
        .with_coordinator(localhost())
        .with_timeout(Duration::from_millis(300))
        .rendezvous()
        .await;
    assert!(matches!(joiner, Err(Error::Timeout)));
    assert!(matches!(coordinator.await.unwrap(), Err(Error::Timeout)));
}
