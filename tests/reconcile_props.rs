use chrono::{DateTime, Duration, TimeZone, Utc};
use coursehub_client::api::models::Message;
use coursehub_client::sync::messages::{MAX_MESSAGES, MessageList};
use coursehub_client::sync::pending::{PendingSendRecord, PendingSends};
use proptest::prelude::*;
use std::collections::HashSet;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn arb_message() -> impl Strategy<Value = Message> {
    (0u32..60, prop_oneof![Just("me"), Just("peer")], 0i64..3_600, "[a-c]{1,3}").prop_map(
        |(id, sender, secs, text)| {
            let receiver = if sender == "me" { "peer" } else { "me" };
            Message {
                id: id.to_string(),
                sender_id: sender.to_string(),
                receiver_id: receiver.to_string(),
                message: text,
                sent_at: at(secs),
                is_deleted: false,
                client_temp_id: None,
            }
        },
    )
}

fn assert_sorted_unique(list: &MessageList) -> Result<(), TestCaseError> {
    let msgs: Vec<&Message> = list.messages().collect();
    for pair in msgs.windows(2) {
        prop_assert!(pair[0].sent_at <= pair[1].sent_at, "out of order: {:?}", pair);
    }
    let ids: HashSet<&str> = msgs.iter().map(|m| m.id.as_str()).collect();
    prop_assert_eq!(ids.len(), msgs.len());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn batches_keep_list_sorted_and_unique(
        batches in prop::collection::vec(prop::collection::vec(arb_message(), 0..20), 1..10),
        sends in prop::collection::vec(("[a-c]{1,3}", 0i64..3_600), 0..5),
    ) {
        let mut list = MessageList::new();
        let mut pending = PendingSends::new();
        for (i, (text, secs)) in sends.into_iter().enumerate() {
            let temp_id = format!("temp-{i}");
            list.upsert(Message {
                id: temp_id.clone(),
                sender_id: "me".into(),
                receiver_id: "peer".into(),
                message: text.clone(),
                sent_at: at(secs),
                is_deleted: false,
                client_temp_id: Some(temp_id.clone()),
            });
            pending.register(temp_id, PendingSendRecord { created_at: at(secs), message: text, receiver_id: "peer".into() });
        }
        for batch in batches {
            list.merge_batch(batch, "me", &mut pending, at(1_800));
            assert_sorted_unique(&list)?;
        }
    }

    #[test]
    fn only_most_recent_survive_capacity(count in (MAX_MESSAGES + 1)..(MAX_MESSAGES + 80)) {
        let mut list = MessageList::new();
        let mut pending = PendingSends::new();
        // Reverse order so eviction cannot rely on arrival order.
        let batch: Vec<Message> = (0..count as i64).rev().map(|i| Message {
            id: i.to_string(),
            sender_id: "peer".into(),
            receiver_id: "me".into(),
            message: "x".into(),
            sent_at: at(i),
            is_deleted: false,
            client_temp_id: None,
        }).collect();
        list.merge_batch(batch, "me", &mut pending, at(0));
        prop_assert_eq!(list.len(), MAX_MESSAGES);
        let oldest_kept = (count - MAX_MESSAGES) as i64;
        prop_assert_eq!(list.messages().next().unwrap().sent_at, at(oldest_kept));
        prop_assert_eq!(list.messages().last().unwrap().sent_at, at(count as i64 - 1));
    }

    #[test]
    fn echo_inside_window_never_duplicates(delay_ms in 0i64..7_000, text in "[a-z ]{1,20}") {
        let mut list = MessageList::new();
        let mut pending = PendingSends::new();
        let sent = at(100);
        list.upsert(Message {
            id: "temp-x".into(),
            sender_id: "me".into(),
            receiver_id: "peer".into(),
            message: text.clone(),
            sent_at: sent,
            is_deleted: false,
            client_temp_id: Some("temp-x".into()),
        });
        pending.register("temp-x".into(), PendingSendRecord { created_at: sent, message: text.clone(), receiver_id: "peer".into() });

        let echo = Message {
            id: "srv-1".into(),
            sender_id: "me".into(),
            receiver_id: "peer".into(),
            message: text,
            sent_at: sent + Duration::milliseconds(delay_ms),
            is_deleted: false,
            client_temp_id: None,
        };
        list.merge_batch(vec![echo], "me", &mut pending, sent + Duration::milliseconds(delay_ms));
        prop_assert_eq!(list.len(), 1);
        prop_assert!(list.contains("srv-1"));
        prop_assert!(pending.is_empty());
    }
}
