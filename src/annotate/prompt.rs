//! Instruction text sent with every request.

use crate::record::{CollectionField, ScalarField, NOTABLE_PLAYERS_KEY, UNKNOWN};

/// Build the instruction for a request carrying `frame_count` frames.
///
/// One frame asks for a single JSON object; more than one asks for a JSON
/// array holding one object per frame, in submission order.
pub fn build_instruction(frame_count: usize) -> String {
    let mut text = String::from(
        "You are analyzing frames from a sports broadcast.\n\
         For each frame, extract the following fields.\n\nScalar fields (a single string each):\n",
    );
    for field in ScalarField::ALL {
        text.push_str("- ");
        text.push_str(field.key());
        text.push('\n');
    }
    text.push_str("\nList fields (JSON arrays of strings):\n");
    for field in CollectionField::ALL {
        text.push_str("- ");
        text.push_str(field.key());
        text.push('\n');
    }
    text.push_str(&format!(
        "\nStructured list field:\n- {NOTABLE_PLAYERS_KEY}: array of objects with \"name\", \
         \"jersey_number\" and \"team\"\n\
         \nAlso include \"reasoning\": one or two sentences on the visual evidence used.\n\
         Use \"{UNKNOWN}\" for any scalar you cannot determine and an empty array for any list \
         you cannot fill. Do not guess.\n"
    ));
    if frame_count <= 1 {
        text.push_str("Return a single JSON object only, with no other text.\n");
    } else {
        text.push_str(&format!(
            "You are given {frame_count} frames. Return a JSON array of exactly {frame_count} \
             objects, one per frame in the order given, with no other text.\n"
        ));
    }
    text
}
