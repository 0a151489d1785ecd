// Mirrors migrations/2025-01-01-000000_create_polls/up.sql.

diesel::table! {
    accounts (id) {
        id -> Uuid,
        email -> Text,
        password_digest -> Text,
        salt -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    polls (id) {
        id -> Uuid,
        question -> Text,
        options -> Jsonb,
        settings -> Nullable<Jsonb>,
        created_by -> Nullable<Uuid>,
        created_at -> Timestamptz,
        ends_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    votes (id) {
        id -> Uuid,
        poll_id -> Uuid,
        user_id -> Nullable<Uuid>,
        ip_hash -> Nullable<Text>,
        selected_options -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(votes -> polls (poll_id));

diesel::allow_tables_to_appear_in_same_query!(
    accounts,
    polls,
    votes,
);
