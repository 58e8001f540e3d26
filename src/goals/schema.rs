diesel::table! {
    goals (id) {
        id -> Integer,
        user_id -> Text,
        title -> Text,
        goal_type -> Text,
        target_value -> Double,
        current_value -> Double,
        target_date -> Nullable<Text>,
        completed -> Bool,
        completed_at -> Nullable<BigInt>,
        last_synced_at -> Nullable<BigInt>,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}
