// Diesel table definitions, kept in sync with the DDL in
// `repository::context::init_schema`.
//
// Row ids and foreign keys are BigInt: SQLite rowids are 64-bit, and the
// domain models carry them as i64 without narrowing.

diesel::table! {
    platforms (id) {
        id -> BigInt,
        name -> Text,
        display_name -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    creators (id) {
        id -> BigInt,
        platform_id -> BigInt,
        platform_account_id -> Text,
        username -> Nullable<Text>,
        display_name -> Nullable<Text>,
        profile_pic_asset_id -> Nullable<BigInt>,
        profile_pic_url -> Nullable<Text>,
        profile_pic_updated_at -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    posts (id) {
        id -> BigInt,
        platform_id -> BigInt,
        creator_id -> BigInt,
        platform_post_id -> Text,
        post_type -> Text,
        url -> Text,
        share_url -> Text,
        title -> Nullable<Text>,
        caption_text -> Nullable<Text>,
        platform_created_at -> Nullable<Text>,
        thumbnail_asset_id -> Nullable<BigInt>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    media_assets (id) {
        id -> BigInt,
        media_type -> Text,
        file_format -> Nullable<Text>,
        source_url -> Nullable<Text>,
        file_size -> BigInt,
        file_path -> Text,
        checksum_sha256 -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    post_media (id) {
        id -> BigInt,
        post_id -> BigInt,
        media_asset_id -> BigInt,
        position -> Integer,
        created_at -> Text,
    }
}

diesel::table! {
    jobs (id) {
        id -> Text,
        share_text -> Text,
        share_url -> Text,
        status -> Text,
        post_id -> Nullable<BigInt>,
        error_history -> Text,
        next_retry_at -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::joinable!(creators -> platforms (platform_id));
diesel::joinable!(posts -> platforms (platform_id));
diesel::joinable!(posts -> creators (creator_id));
diesel::joinable!(post_media -> posts (post_id));
diesel::joinable!(post_media -> media_assets (media_asset_id));

diesel::allow_tables_to_appear_in_same_query!(
    platforms,
    creators,
    posts,
    media_assets,
    post_media,
    jobs,
);
