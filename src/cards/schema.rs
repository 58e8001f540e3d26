diesel::table! {
    content_cards (id) {
        id -> Integer,
        user_id -> Text,
        title -> Text,
        description -> Nullable<Text>,
        status -> Text,
        pillars_json -> Text,
        due_date -> Nullable<Text>,
        progress -> Integer,
        archived -> Bool,
        order_index -> Integer,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}
