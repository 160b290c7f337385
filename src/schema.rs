// Diesel schema for the crawlplane control-plane core, targeting Postgres.
// Enum-shaped columns (status, job_type, error_category, backoff_strategy,
// detection_method) are stored as Text and parsed through the domain enums
// in `crate::models` rather than native Postgres enum types, so that adding
// a variant never requires an `ALTER TYPE` migration.

diesel::table! {
    use diesel::sql_types::{Uuid, Text, Timestamptz, Nullable, Jsonb};

    websites (id) {
        id -> Uuid,
        name -> Text,
        base_url -> Text,
        config -> Jsonb,
        cron_schedule -> Nullable<Text>,
        status -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        deleted_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    use diesel::sql_types::{Uuid, Text, Timestamptz, Jsonb};

    website_config_history (id) {
        id -> Uuid,
        website_id -> Uuid,
        version -> Int4,
        config -> Jsonb,
        changed_by -> Nullable<Text>,
        change_reason -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::sql_types::{Uuid, Text, Timestamptz, Nullable, Bool, Jsonb};

    scheduled_jobs (id) {
        id -> Uuid,
        website_id -> Uuid,
        cron_expression -> Text,
        timezone -> Text,
        next_run_time -> Nullable<Timestamptz>,
        last_run_time -> Nullable<Timestamptz>,
        is_active -> Bool,
        job_config -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::sql_types::{Uuid, Text, Timestamptz, Nullable, Int4, Int2, Jsonb};

    crawl_jobs (id) {
        id -> Uuid,
        website_id -> Nullable<Uuid>,
        inline_config -> Nullable<Jsonb>,
        seed_url -> Text,
        job_type -> Text,
        status -> Text,
        priority -> Int2,
        scheduled_at -> Nullable<Timestamptz>,
        started_at -> Nullable<Timestamptz>,
        completed_at -> Nullable<Timestamptz>,
        cancelled_at -> Nullable<Timestamptz>,
        cancelled_by -> Nullable<Text>,
        cancellation_reason -> Nullable<Text>,
        error_message -> Nullable<Text>,
        retry_count -> Int4,
        max_retries -> Int4,
        metadata -> Jsonb,
        variables -> Jsonb,
        progress -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::sql_types::{Uuid, Text, Timestamptz, Nullable, Bool, Int2, Jsonb};

    crawled_pages (id) {
        id -> Uuid,
        website_id -> Uuid,
        job_id -> Uuid,
        url -> Text,
        url_hash -> Text,
        content_hash -> Nullable<Text>,
        title -> Nullable<Text>,
        extracted_content -> Nullable<Text>,
        metadata -> Jsonb,
        blob_path -> Nullable<Text>,
        is_duplicate -> Bool,
        duplicate_of -> Nullable<Uuid>,
        similarity_score -> Nullable<Int2>,
        crawled_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::sql_types::{Text, Timestamptz, Nullable, Int4, Uuid, BigInt};

    content_hashes (content_hash) {
        content_hash -> Text,
        first_seen_page_id -> Nullable<Uuid>,
        occurrence_count -> Int4,
        simhash_fingerprint -> BigInt,
        last_seen_at -> Timestamptz,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::sql_types::{Uuid, Int4, Timestamptz};

    duplicate_groups (id) {
        id -> Uuid,
        canonical_page_id -> Uuid,
        group_size -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::sql_types::{Uuid, Text, Nullable, Int2, Timestamptz};

    duplicate_relationships (id) {
        id -> Uuid,
        group_id -> Uuid,
        duplicate_page_id -> Uuid,
        detection_method -> Text,
        similarity_score -> Nullable<Int2>,
        confidence_threshold -> Nullable<Int2>,
        detected_by -> Nullable<Text>,
        detected_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::sql_types::{Text, Bool, Int4, Nullable, Float8};

    retry_policies (error_category) {
        error_category -> Text,
        is_retryable -> Bool,
        max_attempts -> Int4,
        backoff_strategy -> Text,
        initial_delay_seconds -> Int4,
        max_delay_seconds -> Int4,
        backoff_multiplier -> Float8,
        description -> Nullable<Text>,
    }
}

diesel::table! {
    use diesel::sql_types::{Uuid, Text, Nullable, Int4, Timestamptz};

    retry_history (id) {
        id -> Uuid,
        job_id -> Uuid,
        attempt_number -> Int4,
        error_category -> Text,
        error_message -> Text,
        stack_trace -> Nullable<Text>,
        retry_delay_seconds -> Int4,
        attempted_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::sql_types::{Uuid, Text, Nullable, Int4, Int2, Bool, Timestamptz};

    dead_letter_queue (id) {
        id -> Uuid,
        job_id -> Uuid,
        seed_url -> Text,
        website_id -> Nullable<Uuid>,
        job_type -> Text,
        priority -> Int2,
        error_category -> Text,
        error_message -> Text,
        stack_trace -> Nullable<Text>,
        http_status -> Nullable<Int4>,
        total_attempts -> Int4,
        first_attempt_at -> Timestamptz,
        last_attempt_at -> Timestamptz,
        resolved -> Bool,
        resolved_at -> Nullable<Timestamptz>,
        resolution_notes -> Nullable<Text>,
        retry_attempted -> Bool,
        retry_success -> Nullable<Bool>,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(website_config_history -> websites (website_id));
diesel::joinable!(scheduled_jobs -> websites (website_id));
diesel::joinable!(duplicate_relationships -> duplicate_groups (group_id));

diesel::allow_tables_to_appear_in_same_query!(
    websites,
    website_config_history,
    scheduled_jobs,
    crawl_jobs,
    crawled_pages,
    content_hashes,
    duplicate_groups,
    duplicate_relationships,
    retry_policies,
    retry_history,
    dead_letter_queue,
);
