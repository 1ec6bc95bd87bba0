use scanlink_core::{EmployeeId, FingerprintId};
use scanlink_notify::{ClientConnection, NotificationHub, Notifier, ProgressEvent, Room};
use serde_json::json;
use std::sync::Arc;

fn drain(client: &mut ClientConnection) -> Vec<(String, serde_json::Value)> {
    std::iter::from_fn(|| client.try_recv())
        .map(|m| (m.event, m.data))
        .collect()
}

#[test]
fn test_guest_denied_global_never_receives_broadcasts() {
    let hub = NotificationHub::default();
    let mut guest = hub.connect();
    let mut manager = hub.connect();

    hub.handle_client_event(guest.id, "subscribe_global", json!({"userRole": "guest"}))
        .unwrap();
    hub.handle_client_event(manager.id, "subscribe_global", json!({"userRole": "hr_manager"}))
        .unwrap();

    let guest_ack = drain(&mut guest).pop().unwrap();
    assert_eq!(guest_ack.0, "subscribed_global");
    assert_eq!(guest_ack.1["success"], false);
    drain(&mut manager);

    hub.emit_to_global("booking_created", json!({"court": 3}));

    assert!(drain(&mut guest).is_empty());
    let received = drain(&mut manager);
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].1["type"], "booking_created");
    assert_eq!(received[0].1["court"], 3);
}

#[test]
fn test_staff_room_isolated_from_employee_rooms() {
    let hub = NotificationHub::default();
    let mut staff = hub.connect();
    let mut kiosk = hub.connect();

    hub.handle_client_event(staff.id, "subscribe_all_employee", json!({"userRole": "employee"}))
        .unwrap();
    hub.handle_client_event(kiosk.id, "subscribe_employee", json!({"employeeID": 7}))
        .unwrap();
    drain(&mut staff);
    drain(&mut kiosk);

    hub.emit_to_all_employee("regular_court_booking_check", json!({"zones": []}));
    hub.emit(
        &Room::Employee(EmployeeId::new(7)),
        ProgressEvent::EnrollSuccess {
            employee_id: EmployeeId::new(7),
            fingerprint_id: FingerprintId::new(2).unwrap(),
        }
        .into(),
    );

    let staff_events: Vec<_> = drain(&mut staff).into_iter().map(|(e, _)| e).collect();
    let kiosk_events: Vec<_> = drain(&mut kiosk).into_iter().map(|(e, _)| e).collect();
    assert_eq!(staff_events, ["regular_court_booking_check"]);
    assert_eq!(kiosk_events, ["enroll_success"]);
}

#[tokio::test]
async fn test_emit_through_shared_notifier() {
    let hub = Arc::new(NotificationHub::default());
    let mut client = hub.connect();
    hub.handle_client_event(client.id, "subscribe_employee", json!({"employeeID": 4}))
        .unwrap();

    let notifier: Arc<dyn Notifier> = hub.clone();
    let producer = tokio::spawn(async move {
        notifier.emit(
            &Room::Employee(EmployeeId::new(4)),
            ProgressEvent::EnrollStep {
                employee_id: EmployeeId::new(4),
                step: "place_again".into(),
            }
            .into(),
        );
    });
    producer.await.unwrap();

    let mut last = None;
    while let Some(message) = client.try_recv() {
        last = Some(message);
    }
    let last = last.unwrap();
    assert_eq!(last.event, "enroll_step");
    assert_eq!(last.data["step"], "place_again");
}

#[test]
fn test_disconnect_clears_membership() {
    let hub = NotificationHub::default();
    let client = hub.connect();
    hub.handle_client_event(client.id, "subscribe_global", json!({"userRole": "admin"}))
        .unwrap();
    assert_eq!(hub.room_size(&Room::Global), 1);

    hub.disconnect(client.id);
    assert_eq!(hub.room_size(&Room::Global), 0);
    assert_eq!(hub.client_count(), 0);
}
