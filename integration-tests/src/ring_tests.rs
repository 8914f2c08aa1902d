//! Ring formation and message propagation scenarios.

use crate::harness::{init_logger, join, next_addr, spawn_create, wait_for_listener, wait_for_ring};

#[tokio::test]
async fn test_two_node_formation_and_origin_stop() {
    init_logger();
    let a_addr = next_addr();
    let b_addr = next_addr();

    let creator = spawn_create(a_addr);
    let mut b = join(b_addr, a_addr).await;
    let mut a = creator.await.unwrap();

    // Each side's predecessor and successor are the other peer.
    assert_eq!(a.handle.predecessor_addr().await, b_addr);
    assert_eq!(a.handle.successor_addr().await, b_addr);
    assert_eq!(b.handle.predecessor_addr().await, a_addr);
    assert_eq!(b.handle.successor_addr().await, a_addr);

    b.handle.send_content("hi").await.unwrap();
    assert_eq!(
        a.expect_delivery().await,
        (b_addr.to_string(), "hi".to_string())
    );

    a.handle.send_content("hello").await.unwrap();
    assert_eq!(
        b.expect_delivery().await,
        (a_addr.to_string(), "hello".to_string())
    );

    // Each message made exactly one lap.
    a.expect_quiet().await;
    b.expect_quiet().await;
}

#[tokio::test]
async fn test_three_node_ring_single_delivery() {
    init_logger();
    let a_addr = next_addr();
    let b_addr = next_addr();
    let c_addr = next_addr();

    let creator = spawn_create(a_addr);
    let mut b = join(b_addr, a_addr).await;
    let mut a = creator.await.unwrap();
    let mut c = join(c_addr, b_addr).await;
    wait_for_ring(&[&a, &b, &c]).await;

    c.handle.send_content("ping").await.unwrap();
    assert_eq!(
        a.expect_delivery().await,
        (c_addr.to_string(), "ping".to_string())
    );
    assert_eq!(
        b.expect_delivery().await,
        (c_addr.to_string(), "ping".to_string())
    );

    // The origin never hears its own broadcast, and nobody hears it twice.
    c.expect_quiet().await;
    a.expect_quiet().await;
    b.expect_quiet().await;
}

#[tokio::test]
async fn test_nickname_changes_displayed_name() {
    init_logger();
    let a_addr = next_addr();
    let b_addr = next_addr();
    let c_addr = next_addr();

    let creator = spawn_create(a_addr);
    let mut b = join(b_addr, a_addr).await;
    let mut a = creator.await.unwrap();
    let mut c = join(c_addr, b_addr).await;
    wait_for_ring(&[&a, &b, &c]).await;

    // The rename and the message travel the same path in order, so the
    // new name is in place everywhere before the text arrives.
    b.handle.change_nickname("bob").await.unwrap();
    b.handle.send_content("yo").await.unwrap();

    assert_eq!(
        a.expect_delivery().await,
        ("bob".to_string(), "yo".to_string())
    );
    assert_eq!(
        c.expect_delivery().await,
        ("bob".to_string(), "yo".to_string())
    );
    b.expect_quiet().await;
}

#[tokio::test]
async fn test_concurrent_joiners_admitted_serially() {
    init_logger();
    let a_addr = next_addr();
    let b_addr = next_addr();
    let d_addr = next_addr();
    let e_addr = next_addr();

    let creator = spawn_create(a_addr);
    let mut b = join(b_addr, a_addr).await;
    let mut a = creator.await.unwrap();
    wait_for_listener(a_addr).await;

    // Both joiners race for A's admission slot; it admits them one at a
    // time and both end up members.
    let (mut d, mut e) = tokio::join!(join(d_addr, a_addr), join(e_addr, a_addr));
    wait_for_ring(&[&a, &b, &d, &e]).await;

    a.handle.send_content("assemble").await.unwrap();
    for node in [&mut b, &mut d, &mut e] {
        assert_eq!(
            node.expect_delivery().await,
            (a_addr.to_string(), "assemble".to_string())
        );
    }

    // No duplicate deliveries anywhere.
    a.expect_quiet().await;
    b.expect_quiet().await;
    d.expect_quiet().await;
    e.expect_quiet().await;
}
