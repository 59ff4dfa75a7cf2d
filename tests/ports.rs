#![cfg(feature = "ports")]

use std::sync::{atomic, Arc};

use weft::ports::{
    are_clients_connected, are_connected, connect, connect_clients, connect_clients_with,
    disconnect, disconnect_clients, Client, Server,
};

#[test]
fn teardown_from_server_side() {
    let client = Client::<u32>::new();

    {
        let server = Server::with_data(Arc::new(5_u32));
        connect(&client, &server);
        assert_eq!(true, are_connected(&client, &server));
    }

    // The Server is gone, the Client must not see any shared value anymore
    let mut count = 0;
    client.for_each(|_| count += 1);
    assert_eq!(0, count);
    assert_eq!(false, client.has_connections());

    drop(client);
}

#[test]
fn teardown_from_client_side() {
    let server = Server::with_data(Arc::new(5_u32));

    {
        let client = Client::new();
        connect(&client, &server);
        assert_eq!(true, server.has_connections());
    }

    assert_eq!(false, server.has_connections());
}

#[test]
fn reconnect_after_disconnect() {
    let client = Client::new();
    let server = Server::with_data(Arc::new(1_u32));

    connect(&client, &server);
    disconnect(&client, &server);
    assert_eq!(false, are_connected(&client, &server));

    connect(&client, &server);
    assert_eq!(true, are_connected(&client, &server));

    let mut seen = Vec::new();
    client.for_each(|value| seen.push(*value));
    assert_eq!(vec![1], seen);
}

#[test]
fn disconnect_unconnected_is_noop() {
    let client = Client::<u32>::new();
    let server = Server::<u32>::new();

    disconnect(&client, &server);
    assert_eq!(false, are_connected(&client, &server));

    let first = Client::<u32>::new();
    let second = Client::<u32>::new();
    disconnect_clients(&first, &second);
    assert_eq!(false, are_clients_connected(&first, &second));
}

#[test]
fn client_pair_shares_supplied_value() {
    let first = Client::new();
    let second = Client::new();

    let shared = Arc::new(atomic::AtomicU64::new(0));
    connect_clients_with(&first, &second, shared.clone());

    first.for_each(|counter| {
        counter.fetch_add(1, atomic::Ordering::SeqCst);
    });
    second.for_each(|counter| {
        counter.fetch_add(1, atomic::Ordering::SeqCst);
    });

    assert_eq!(2, shared.load(atomic::Ordering::SeqCst));
}

#[test]
fn client_pair_default_value() {
    let first = Client::<u32>::new();
    let second = Client::<u32>::new();

    connect_clients(&first, &second);
    assert_eq!(true, are_clients_connected(&first, &second));
    assert_eq!(true, are_clients_connected(&second, &first));
}

#[test]
fn one_server_many_clients() {
    let server = Server::with_data(Arc::new(atomic::AtomicU64::new(0)));

    let clients: Vec<_> = (0..5).map(|_| Client::new()).collect();
    for client in &clients {
        connect(client, &server);
    }

    for client in &clients {
        client.for_each(|counter| {
            counter.fetch_add(1, atomic::Ordering::SeqCst);
        });
    }

    assert_eq!(5, server.data().load(atomic::Ordering::SeqCst));
}

#[test]
fn iteration_races_disconnect() {
    let server = Server::with_data(Arc::new(atomic::AtomicU64::new(0)));
    let client = Client::new();

    let done = Arc::new(atomic::AtomicBool::new(false));

    std::thread::scope(|scope| {
        let reader = scope.spawn(|| {
            while !done.load(atomic::Ordering::SeqCst) {
                client.for_each(|counter| {
                    counter.fetch_add(1, atomic::Ordering::SeqCst);
                });
            }
        });

        for _ in 0..1_000 {
            connect(&client, &server);
            disconnect(&client, &server);
        }
        done.store(true, atomic::Ordering::SeqCst);

        reader.join().unwrap();
    });

    assert_eq!(false, are_connected(&client, &server));
}
