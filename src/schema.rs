// @generated manually to match migrations/2024-01-01-000000_create_identity_core

diesel::table! {
    accounts (account_id) {
        account_id -> Int8,
        account_info -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    account_credentials (credential, account_id) {
        credential -> Text,
        account_id -> Int8,
    }
}

diesel::joinable!(account_credentials -> accounts (account_id));
diesel::allow_tables_to_appear_in_same_query!(accounts, account_credentials,);
