table! {
    users (id) {
        id -> Uuid,
        npp -> Varchar,
        password_hash -> Varchar,
        role -> Varchar,
        name -> Varchar,
        created_at -> Timestamptz,
    }
}

table! {
    members (id) {
        id -> Uuid,
        user_id -> Uuid,
        member_number -> Nullable<Varchar>,
        nik -> Varchar,
        name -> Varchar,
        birth_place -> Nullable<Varchar>,
        birth_date -> Nullable<Date>,
        gender -> Nullable<Varchar>,
        address -> Nullable<Varchar>,
        phone -> Nullable<Varchar>,
        company -> Nullable<Varchar>,
        work_unit -> Nullable<Varchar>,
        work_location -> Nullable<Varchar>,
        position -> Nullable<Varchar>,
        status -> Varchar,
        photo_url -> Nullable<Varchar>,
        signature_url -> Nullable<Varchar>,
        join_date -> Nullable<Date>,
        created_at -> Timestamptz,
    }
}

table! {
    savings_entries (id) {
        id -> Uuid,
        member_id -> Uuid,
        savings_type -> Varchar,
        direction -> Varchar,
        amount -> Numeric,
        period_month -> Int2,
        period_year -> Int2,
        created_at -> Timestamptz,
    }
}

table! {
    loans (id) {
        id -> Uuid,
        member_id -> Uuid,
        principal -> Numeric,
        tenor_months -> Int2,
        interest_type -> Varchar,
        interest_rate -> Int2,
        status -> Varchar,
        issue_date -> Date,
        created_at -> Timestamptz,
    }
}

table! {
    installments (id) {
        id -> Uuid,
        loan_id -> Uuid,
        period_index -> Int2,
        principal_due -> Numeric,
        interest_due -> Numeric,
        due_date -> Date,
        paid -> Bool,
        paid_at -> Nullable<Timestamptz>,
    }
}

table! {
    master_data (id) {
        id -> Uuid,
        category -> Varchar,
        value -> Varchar,
    }
}

joinable!(members -> users (user_id));
joinable!(savings_entries -> members (member_id));
joinable!(loans -> members (member_id));
joinable!(installments -> loans (loan_id));

allow_tables_to_appear_in_same_query!(
    users,
    members,
    savings_entries,
    loans,
    installments,
    master_data,
);
