//! End-to-end receive scenarios through the supervisor

mod common;

use approx::assert_relative_eq;
use common::{CAPACITY, TestHost, test_config, wait_until};
use spectator_link::host::{encode_mesh_set, fragment_mesh_set};
use spectator_link::mesh::decode_mesh_set;
use spectator_link::protocol::SpatialMappingFragment;
use spectator_link::{
    CachedPose, Config, ConnectionState, Mesh, MeshTransform, PoseSample, RemainderPolicy,
    SharedState, Supervisor, SupervisorHandle,
};
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(3);

fn start(config: &Config) -> (Arc<SharedState>, TestHost, SupervisorHandle) {
    let shared = Arc::new(SharedState::new(config.pose.cache_capacity));
    let (host, connector) = TestHost::new(shared.running_flag());
    let supervisor = Supervisor::start(config, connector, Arc::clone(&shared)).unwrap();
    (shared, host, supervisor)
}

/// 52-byte mesh set: one mesh, transform, and a single 4-byte partial vertex
fn partial_vertex_mesh_set() -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend(44i32.to_le_bytes());
    bytes.extend(0i32.to_le_bytes());
    bytes.extend(MeshTransform::IDENTITY.to_bytes());
    bytes.extend(1.0f32.to_le_bytes());
    assert_eq!(bytes.len(), 52);
    bytes
}

fn triangle_meshes() -> Vec<Mesh> {
    vec![Mesh {
        vertex_section_len: 40 + 36,
        index_section_len: 6,
        transform: MeshTransform {
            translation: [0.0, 1.0, 0.0],
            ..MeshTransform::IDENTITY
        },
        vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, -1.0], [0.0, 1.0, -1.0]],
        indices: vec![0, 1, 2],
    }]
}

#[test]
fn pose_is_cached_with_converted_time() {
    let (shared, host, supervisor) = start(&test_config());
    let mut link = host.accept();

    link.write_pose(&PoseSample::new([1.0, 0.0, 0.0], [0.0, 0.5, 0.0, 1.0], 10000))
        .unwrap();
    assert!(wait_until(TIMEOUT, || shared.stats().poses_received == 1));
    assert!(shared.is_connected());

    let pose = shared.pose(0);
    assert_eq!(pose.position(), [1.0, 0.0, 0.0]);
    assert_eq!(pose.rotation(), [0.0, 0.5, 0.0, 1.0]);
    assert_relative_eq!(pose.time_seconds, 1.0, epsilon = 1e-9);
    assert_eq!(shared.pose(1), CachedPose::NEUTRAL);

    shared.reset_pose_cache();
    assert_eq!(shared.pose(0), CachedPose::NEUTRAL);

    supervisor.shutdown();
    assert_eq!(shared.connection_state(), ConnectionState::Disconnected);
}

#[test]
fn two_fragment_set_with_partial_vertex_is_truncated() {
    let (shared, host, supervisor) = start(&test_config());
    let mut link = host.accept();

    let bytes = partial_vertex_mesh_set();
    let fragments = fragment_mesh_set(&bytes, CAPACITY).unwrap();
    assert_eq!(fragments.len(), 2);
    assert_eq!(fragments[1].start_index, 26);
    for fragment in &fragments {
        link.write_fragment(fragment).unwrap();
    }

    assert!(wait_until(TIMEOUT, || shared.mesh_set_ready()));
    let set = shared.take_mesh_set().unwrap();
    assert_eq!(set.len(), 1);
    assert_eq!(set.meshes[0].vertex_section_len - 40, 4);
    assert_eq!(set.meshes[0].vertex_count(), 0);
    assert_eq!(set.meshes[0].index_count(), 0);
    assert!(shared.take_mesh_set().is_none());
    assert!(shared.is_connected());

    supervisor.shutdown();
}

#[test]
fn partial_vertex_under_reject_policy_forces_reconnect() {
    let mut config = test_config();
    config.mesh.remainder_policy = RemainderPolicy::Reject;
    let (shared, host, supervisor) = start(&config);
    let mut link = host.accept();

    link.write_mesh_set(&partial_vertex_mesh_set()).unwrap();

    assert!(wait_until(TIMEOUT, || shared.stats().receive_errors == 1));
    assert!(wait_until(TIMEOUT, || {
        shared.connection_state() == ConnectionState::Connecting
    }));
    assert!(shared.take_mesh_set().is_none());

    supervisor.shutdown();
}

#[test]
fn interrupted_set_leaves_no_residue_after_reconnect() {
    let (shared, host, supervisor) = start(&test_config());
    let meshes = triangle_meshes();
    let bytes = encode_mesh_set(&meshes).unwrap();
    let fragment_count = fragment_mesh_set(&bytes, CAPACITY).unwrap().len();
    assert_eq!(fragment_count, 4);

    // First connection dies after one bogus fragment of a same-shaped set
    let mut first = host.accept();
    first
        .write_fragment(&SpatialMappingFragment::new(
            bytes.len(),
            0,
            fragment_count,
            vec![0xFF; CAPACITY],
        ))
        .unwrap();
    assert!(wait_until(TIMEOUT, || shared.stats().fragments_received == 1));
    assert!(shared.is_connected());
    drop(first);

    assert!(wait_until(TIMEOUT, || {
        shared.connection_state() == ConnectionState::Connecting
    }));
    assert_eq!(shared.stats().reconnects, 1);

    let mut second = host.accept();
    assert_eq!(second.write_mesh_set(&bytes).unwrap(), fragment_count);
    assert!(wait_until(TIMEOUT, || shared.mesh_set_ready()));
    assert!(shared.is_connected());

    let set = shared.take_mesh_set().unwrap();
    assert_eq!(set.sequence, 1);
    assert_eq!(set.meshes, meshes);
    assert_eq!(
        set.meshes,
        decode_mesh_set(&bytes, RemainderPolicy::Reject).unwrap()
    );

    let stats = shared.stats();
    assert_eq!(stats.receive_errors, 1);
    assert_eq!(stats.mesh_sets_published, 1);

    supervisor.shutdown();
}

#[test]
fn unknown_discriminator_forces_reconnect_without_decoding() {
    let (shared, host, supervisor) = start(&test_config());

    let stale = PoseSample::new([9.0, 9.0, 9.0], [0.0, 0.0, 0.0, 1.0], 1);
    let mut bytes = 7i32.to_le_bytes().to_vec();
    bytes.extend(stale.to_bytes());
    host.accept_bytes(&bytes);

    assert!(wait_until(TIMEOUT, || shared.stats().receive_errors == 1));
    let stats = shared.stats();
    assert_eq!(stats.poses_received, 0);
    assert_eq!(stats.fragments_received, 0);
    assert_eq!(shared.pose(0), CachedPose::NEUTRAL);

    let mut link = host.accept();
    let fresh = PoseSample::new([0.5, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0], 20000);
    link.write_pose(&fresh).unwrap();
    assert!(wait_until(TIMEOUT, || shared.stats().poses_received == 1));
    assert_eq!(shared.pose(0).sample, fresh);
    assert!(shared.stats().reconnects >= 1);

    supervisor.shutdown();
}

#[test]
fn unconsumed_mesh_set_is_replaced_by_newer() {
    let (shared, host, supervisor) = start(&test_config());
    let mut link = host.accept();

    let first = encode_mesh_set(&triangle_meshes()).unwrap();
    let mut two = triangle_meshes();
    two.extend(triangle_meshes());
    let second = encode_mesh_set(&two).unwrap();

    link.write_mesh_set(&first).unwrap();
    link.write_mesh_set(&second).unwrap();
    assert!(wait_until(TIMEOUT, || shared.stats().mesh_sets_published == 2));

    let set = shared.take_mesh_set().unwrap();
    assert_eq!(set.sequence, 2);
    assert_eq!(set.len(), 2);
    assert!(shared.take_mesh_set().is_none());
    assert_eq!(shared.stats().mesh_sets_replaced, 1);

    supervisor.shutdown();
}

#[test]
fn poses_interleaved_with_fragments_keep_stream_order() {
    let (shared, host, supervisor) = start(&test_config());
    let mut link = host.accept();

    let bytes = encode_mesh_set(&triangle_meshes()).unwrap();
    let fragments = fragment_mesh_set(&bytes, CAPACITY).unwrap();
    for (i, fragment) in fragments.iter().enumerate() {
        link.write_pose(&PoseSample::new([i as f32, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0], i as i64))
            .unwrap();
        link.write_fragment(fragment).unwrap();
    }

    assert!(wait_until(TIMEOUT, || shared.mesh_set_ready()));
    assert_eq!(shared.stats().poses_received, fragments.len() as u64);
    let newest = (fragments.len() - 1) as i64;
    assert_eq!(shared.pose(0).sample.sent_time, newest);
    assert_eq!(shared.pose(1).sample.sent_time, newest - 1);

    supervisor.shutdown();
}
