diesel::table! {
    saved_suggestions (id) {
        id -> Integer,
        user_id -> Text,
        suggestion_type -> Text,
        content -> Text,
        agent -> Nullable<Text>,
        implemented -> Bool,
        implemented_at -> Nullable<BigInt>,
        feedback -> Nullable<Text>,
        feedback_note -> Nullable<Text>,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}
