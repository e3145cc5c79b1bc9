use std::sync::OnceLock;

use replica::buffer::NetReader;
use replica::protocol::{self, RpcTarget};
use replica::{
    BehaviourLink, Color, DecodeError, MemoryTransport, NetBuffer, NetError, NetworkBehaviour,
    NetworkId, NetworkManager, NetworkObject, NetworkVariable, PacketKind, Role, RpcArgs,
    RpcError, RpcRegistry, RpcValue, SharedVariable, Transport, inbox,
};

const SCORE_PREFAB: i32 = 7;
const TANK_PREFAB: i32 = 3;

#[derive(Default)]
struct Score {
    link: BehaviourLink,
    points: NetworkVariable<i32>,
    reasons: Vec<String>,
    announcements: Vec<(String, f32, bool, Color)>,
}

impl Score {
    fn rpcs() -> &'static RpcRegistry<Score> {
        static RPCS: OnceLock<RpcRegistry<Score>> = OnceLock::new();
        RPCS.get_or_init(|| {
            RpcRegistry::new()
                .server_rpc("add_points", Score::add_points)
                .client_rpc("announce", Score::announce)
        })
    }

    fn add_points(&mut self, args: &mut RpcArgs) -> Result<(), RpcError> {
        let points = args.int()?;
        let reason = args.string()?;
        self.points.set(self.points.get() + points);
        self.reasons.push(reason);
        Ok(())
    }

    fn announce(&mut self, args: &mut RpcArgs) -> Result<(), RpcError> {
        let text = args.string()?;
        let scale = args.float()?;
        let loud = args.boolean()?;
        let color = args.color()?;
        self.announcements.push((text, scale, loud, color));
        Ok(())
    }
}

impl NetworkBehaviour for Score {
    fn link(&self) -> &BehaviourLink {
        &self.link
    }

    fn link_mut(&mut self) -> &mut BehaviourLink {
        &mut self.link
    }

    fn network_variables(&self) -> Vec<SharedVariable> {
        vec![self.points.shared()]
    }

    fn handle_rpc(
        &mut self,
        method: &str,
        args: &mut RpcArgs,
        received_on: Role,
    ) -> Result<(), RpcError> {
        Self::rpcs().dispatch(self, method, args, received_on)
    }
}

struct Hull {
    link: BehaviourLink,
    x: NetworkVariable<f32>,
    name: NetworkVariable<String>,
    color: NetworkVariable<Color>,
    alive: NetworkVariable<bool>,
}

impl Default for Hull {
    fn default() -> Self {
        Self {
            link: BehaviourLink::new(),
            x: NetworkVariable::new(0.0),
            name: NetworkVariable::new(String::from("tank")),
            color: NetworkVariable::new(Color::WHITE),
            alive: NetworkVariable::new(true),
        }
    }
}

impl NetworkBehaviour for Hull {
    fn link(&self) -> &BehaviourLink {
        &self.link
    }

    fn link_mut(&mut self) -> &mut BehaviourLink {
        &mut self.link
    }

    fn network_variables(&self) -> Vec<SharedVariable> {
        vec![
            self.x.shared(),
            self.name.shared(),
            self.color.shared(),
            self.alive.shared(),
        ]
    }
}

fn register_prefabs(manager: &mut NetworkManager) {
    manager.register_prefab(SCORE_PREFAB, || {
        NetworkObject::new().with_behaviour(Score::default())
    });
    manager.register_prefab(TANK_PREFAB, || {
        NetworkObject::new()
            .with_behaviour(Hull::default())
            .with_behaviour(Score::default())
    });
}

fn session() -> (NetworkManager, NetworkManager) {
    let _ = env_logger::builder().is_test(true).try_init();
    let server_transport = MemoryTransport::new(Role::Server);
    let client_transport = MemoryTransport::new(Role::Client);
    MemoryTransport::connect_pair(&server_transport, &client_transport);

    let mut server = NetworkManager::new(server_transport);
    let mut client = NetworkManager::new(client_transport);
    register_prefabs(&mut server);
    register_prefabs(&mut client);
    (server, client)
}

fn behaviour<B: NetworkBehaviour>(manager: &NetworkManager, id: NetworkId, index: usize) -> &B {
    manager
        .get_network_object(id)
        .and_then(|o| o.behaviour::<B>(index))
        .unwrap()
}

fn behaviour_mut<B: NetworkBehaviour>(
    manager: &mut NetworkManager,
    id: NetworkId,
    index: usize,
) -> &mut B {
    manager
        .get_network_object_mut(id)
        .and_then(|o| o.behaviour_mut::<B>(index))
        .unwrap()
}

fn i32_words(payload: &[u8]) -> Vec<i32> {
    let mut reader = NetReader::new(payload);
    let mut words = Vec::new();
    while reader.remaining() >= 4 {
        words.push(reader.read_i32().unwrap());
    }
    words
}

#[test]
fn test_spawn_then_delta_wire_scenario() {
    let server_transport = MemoryTransport::new(Role::Server);
    let client_transport = MemoryTransport::new(Role::Client);
    MemoryTransport::connect_pair(&server_transport, &client_transport);
    let (sink, wire) = inbox();
    client_transport.set_receiver(sink);

    let mut server = NetworkManager::new(server_transport);
    register_prefabs(&mut server);

    let id = server.spawn_with_prefab(SCORE_PREFAB).unwrap();
    assert_eq!(id, 1);
    assert_eq!(i32_words(&wire.try_recv().unwrap()), vec![0x11, 1, 7]);

    behaviour::<Score>(&server, id, 0).points.set(42);
    assert_eq!(server.tick().unwrap(), 1);
    let delta = wire.try_recv().unwrap();
    assert_eq!(i32_words(&delta), vec![0x10, 1, 1, 0, 42]);

    let client_transport = MemoryTransport::new(Role::Client);
    let mut client = NetworkManager::new(client_transport);
    register_prefabs(&mut client);
    client
        .try_receive_data(&[0, 0, 0, 0x11, 0, 0, 0, 1, 0, 0, 0, 7])
        .unwrap();
    client.try_receive_data(&delta).unwrap();
    let score = behaviour::<Score>(&client, 1, 0);
    assert_eq!(score.points.get(), 42);
    assert!(!score.points.is_dirty());
}

#[test]
fn test_spawn_symmetry() {
    let (mut server, mut client) = session();
    let id = server.spawn_with_prefab(TANK_PREFAB).unwrap();
    assert_eq!(client.poll(), 1);

    let mirror = client.get_network_object(id).unwrap();
    assert_eq!(mirror.prefab_id(), TANK_PREFAB);
    assert_eq!(mirror.variable_count(), 5);
    assert_eq!(mirror.count_dirty_variables(), 0);
    assert_eq!(
        mirror.variable_count(),
        server.get_network_object(id).unwrap().variable_count()
    );
    assert_eq!(behaviour::<Score>(&client, id, 1).behaviour_index(), 1);
    assert!(behaviour::<Hull>(&client, id, 0).is_client());
    assert!(behaviour::<Hull>(&server, id, 0).is_server());

    let hull = behaviour::<Hull>(&server, id, 0);
    hull.x.set(12.5);
    hull.name.set(String::from("T-34"));
    hull.color.set(Color::new(10, 20, 30, 40));
    hull.alive.set(false);
    behaviour::<Score>(&server, id, 1).points.set(3);
    assert_eq!(server.tick().unwrap(), 1);
    assert_eq!(client.poll(), 1);

    let hull = behaviour::<Hull>(&client, id, 0);
    assert_eq!(hull.x.get(), 12.5);
    assert_eq!(hull.name.get(), "T-34");
    assert_eq!(hull.color.get(), Color::new(10, 20, 30, 40));
    assert!(!hull.alive.get());
    assert_eq!(behaviour::<Score>(&client, id, 1).points.get(), 3);
}

#[test]
fn test_replayed_delta_is_a_no_op() {
    let (mut server, mut client) = session();
    let id = server.spawn_with_prefab(SCORE_PREFAB).unwrap();
    client.poll();

    let mut buf = NetBuffer::new();
    buf.write_i32(PacketKind::StateDelta.tag()).unwrap();
    buf.write_i32(id).unwrap();
    buf.write_i32(1).unwrap();
    buf.write_i32(0).unwrap();
    buf.write_i32(77).unwrap();
    let delta = buf.to_byte_array();

    client.try_receive_data(&delta).unwrap();
    client.try_receive_data(&delta).unwrap();
    let points = behaviour::<Score>(&client, id, 0).points.clone();
    assert_eq!(points.get(), 77);
    assert!(!points.is_dirty());
    client.try_receive_data(&delta).unwrap();
    assert_eq!(points.get(), 77);
    assert!(!points.is_dirty());
}

#[test]
fn test_despawn_removes_only_that_object() {
    let (mut server, mut client) = session();
    let first = server.spawn_with_prefab(SCORE_PREFAB).unwrap();
    let second = server.spawn_with_prefab(SCORE_PREFAB).unwrap();
    server.tick().unwrap();
    client.poll();
    assert_eq!(client.network_ids(), vec![first, second]);

    assert!(server.despawn(first).unwrap());
    client.poll();
    assert!(server.get_network_object(first).is_none());
    assert!(client.get_network_object(first).is_none());
    assert!(client.get_network_object(second).is_some());

    behaviour::<Score>(&server, second, 0).points.set(999);
    server.tick().unwrap();
    client.poll();
    assert_eq!(behaviour::<Score>(&client, second, 0).points.get(), 999);
}

#[test]
fn test_server_rpc_runs_on_server() {
    let (mut server, mut client) = session();
    let id = server.spawn_with_prefab(TANK_PREFAB).unwrap();
    server.tick().unwrap();
    client.poll();

    behaviour::<Score>(&client, id, 1)
        .send_server_rpc("add_points", &[RpcValue::Int(5), RpcValue::from("capture")])
        .unwrap();
    assert_eq!(server.poll(), 1);

    let score = behaviour::<Score>(&server, id, 1);
    assert_eq!(score.points.get(), 5);
    assert_eq!(score.reasons, vec![String::from("capture")]);

    server.tick().unwrap();
    client.poll();
    assert_eq!(behaviour::<Score>(&client, id, 1).points.get(), 5);
}

#[test]
fn test_client_rpc_runs_on_clients() {
    let (mut server, mut client) = session();
    let id = server.spawn_with_prefab(SCORE_PREFAB).unwrap();
    client.poll();

    behaviour::<Score>(&server, id, 0)
        .send_client_rpc(
            "announce",
            &[
                RpcValue::from("round over"),
                RpcValue::Float(1.5),
                RpcValue::Bool(true),
                RpcValue::Color(Color::RED),
            ],
        )
        .unwrap();
    assert_eq!(client.poll(), 1);

    assert_eq!(
        behaviour::<Score>(&client, id, 0).announcements,
        vec![(String::from("round over"), 1.5, true, Color::RED)]
    );
    assert!(behaviour::<Score>(&server, id, 0).announcements.is_empty());
}

#[test]
fn test_server_only_method_is_rejected_on_client() {
    let (mut server, mut client) = session();
    let id = server.spawn_with_prefab(SCORE_PREFAB).unwrap();
    client.poll();

    let mut buf = NetBuffer::new();
    protocol::encode_rpc(
        &mut buf,
        PacketKind::ClientRpc,
        &RpcTarget {
            network_id: id,
            behaviour_index: 0,
            method: String::from("add_points"),
        },
        &[RpcValue::Int(100), RpcValue::from("cheat")],
    )
    .unwrap();
    assert_eq!(
        client.try_receive_data(&buf.to_byte_array()),
        Err(DecodeError::Rpc(RpcError::WrongSide {
            method: String::from("add_points"),
            role: Role::Client
        }))
    );
    assert_eq!(behaviour::<Score>(&client, id, 0).points.get(), 0);

    let mut buf = NetBuffer::new();
    protocol::encode_rpc(
        &mut buf,
        PacketKind::ServerRpc,
        &RpcTarget {
            network_id: id,
            behaviour_index: 0,
            method: String::from("add_points"),
        },
        &[RpcValue::Int(1), RpcValue::from("x")],
    )
    .unwrap();
    assert!(matches!(
        client.try_receive_data(&buf.to_byte_array()),
        Err(DecodeError::WrongRole { .. })
    ));
}

#[test]
fn test_rpc_to_unknown_targets_is_dropped() {
    let (mut server, mut client) = session();
    let id = server.spawn_with_prefab(SCORE_PREFAB).unwrap();
    client.poll();

    let target = |network_id, behaviour_index, method: &str| RpcTarget {
        network_id,
        behaviour_index,
        method: method.to_owned(),
    };
    let encode = |target: RpcTarget| {
        let mut buf = NetBuffer::new();
        protocol::encode_rpc(&mut buf, PacketKind::ServerRpc, &target, &[]).unwrap();
        buf.to_byte_array()
    };

    assert_eq!(
        server.try_receive_data(&encode(target(40, 0, "add_points"))),
        Err(DecodeError::UnknownObject(40))
    );
    assert_eq!(
        server.try_receive_data(&encode(target(id, 3, "add_points"))),
        Err(DecodeError::UnknownBehaviour {
            network_id: id,
            index: 3
        })
    );
    assert_eq!(
        server.try_receive_data(&encode(target(id, 0, "self_destruct"))),
        Err(DecodeError::Rpc(RpcError::UnknownMethod(String::from(
            "self_destruct"
        ))))
    );
    assert_eq!(
        server.try_receive_data(&encode(target(id, 0, "add_points"))),
        Err(DecodeError::Rpc(RpcError::MissingArgument {
            index: 0,
            expected: "int"
        }))
    );
}

#[test]
fn test_wrong_role_and_unattached_calls_fail() {
    let (mut server, mut client) = session();
    let id = server.spawn_with_prefab(SCORE_PREFAB).unwrap();
    client.poll();

    assert!(matches!(
        client.spawn_with_prefab(SCORE_PREFAB),
        Err(NetError::RoleViolation {
            operation: "spawn_with_prefab",
            role: Role::Client
        })
    ));
    assert!(matches!(
        client.tick(),
        Err(NetError::RoleViolation { operation: "tick", .. })
    ));
    assert!(matches!(
        client.despawn(id),
        Err(NetError::RoleViolation { .. })
    ));
    assert!(matches!(
        behaviour::<Score>(&client, id, 0).send_client_rpc("announce", &[]),
        Err(NetError::RoleViolation { .. })
    ));
    assert!(matches!(
        behaviour::<Score>(&server, id, 0).send_server_rpc("add_points", &[]),
        Err(NetError::RoleViolation { .. })
    ));
    assert!(matches!(
        Score::default().send_server_rpc("add_points", &[]),
        Err(NetError::NotAttached)
    ));
}

#[test]
fn test_unknown_prefab_spawn_is_dropped() {
    let (_server, mut client) = session();
    let spawn = [0, 0, 0, 0x11, 0, 0, 0, 1, 0, 0, 0, 99];
    assert_eq!(
        client.try_receive_data(&spawn),
        Err(DecodeError::UnknownPrefab(99))
    );
    client.on_receive_data(&spawn);
    assert_eq!(client.object_count(), 0);
}

#[test]
fn test_out_of_range_index_abandons_rest_of_packet() {
    let (mut server, mut client) = session();
    let id = server.spawn_with_prefab(TANK_PREFAB).unwrap();
    client.poll();

    let mut buf = NetBuffer::new();
    buf.write_i32(PacketKind::StateDelta.tag()).unwrap();
    buf.write_i32(id).unwrap();
    buf.write_i32(3).unwrap();
    buf.write_i32(0).unwrap();
    buf.write_f32(8.0).unwrap();
    buf.write_i32(9).unwrap();
    buf.write_i32(4).unwrap();
    buf.write_i32(21).unwrap();

    assert_eq!(
        client.try_receive_data(&buf.to_byte_array()),
        Err(DecodeError::VariableIndexOutOfRange {
            network_id: id,
            index: 9,
            count: 5
        })
    );
    assert_eq!(behaviour::<Hull>(&client, id, 0).x.get(), 8.0);
    assert_eq!(behaviour::<Score>(&client, id, 1).points.get(), 0);
}

#[test]
fn test_local_player_flag_reaches_behaviours() {
    let (mut server, mut client) = session();
    let id = server.spawn_with_prefab(TANK_PREFAB).unwrap();
    client.poll();

    assert!(!behaviour::<Hull>(&client, id, 0).is_local_player());
    assert!(client.set_local_player(id, true));
    assert!(behaviour::<Hull>(&client, id, 0).is_local_player());
    assert!(behaviour_mut::<Score>(&mut client, id, 1).is_local_player());
    assert!(!client.set_local_player(id + 1, true));
    assert!(!behaviour::<Hull>(&server, id, 0).is_local_player());
}

#[test]
fn test_client_disconnect_drops_mirrors() {
    let (mut server, mut client) = session();
    server.spawn_with_prefab(SCORE_PREFAB).unwrap();
    client.poll();
    assert_eq!(client.object_count(), 1);

    client.disconnect();
    assert_eq!(client.object_count(), 0);
    assert_eq!(server.object_count(), 1);

    server.spawn_with_prefab(SCORE_PREFAB).unwrap();
    assert_eq!(client.poll(), 0);
    assert_eq!(server.transport().stats().packets_sent, 1);
}
