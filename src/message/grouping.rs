use super::models::Message;

/// Recomputes `start_of_block` / `end_of_block` for a run of messages
///
/// Consecutive messages from the same sender form one visual block. Messages
/// without a sender always stand alone.
pub fn apply_block_grouping(messages: &mut [Message]) {
    let len = messages.len();
    for i in 0..len {
        let start_of_block = i == 0 || !same_sender(&messages[i - 1], &messages[i]);
        let end_of_block = i + 1 == len || !same_sender(&messages[i], &messages[i + 1]);
        messages[i].start_of_block = start_of_block;
        messages[i].end_of_block = end_of_block;
    }
}

fn same_sender(a: &Message, b: &Message) -> bool {
    match (&a.from, &b.from) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
