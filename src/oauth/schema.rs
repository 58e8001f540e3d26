diesel::table! {
    oauth_sessions (id) {
        id -> Integer,
        user_id -> Text,
        state -> Text,
        code_verifier -> Text,
        created_at -> BigInt,
        expires_at -> BigInt,
    }
}

diesel::table! {
    oauth_tokens (id) {
        id -> Integer,
        user_id -> Text,
        access_token -> Text,
        refresh_token -> Nullable<Text>,
        token_type -> Text,
        scopes -> Text,
        expires_at -> BigInt,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}
