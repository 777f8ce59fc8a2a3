// Route handlers. Access policies are attached per route group in `app.rs`;
// handlers only see the request once the policy has passed.
pub mod activity;
pub mod auth;
pub mod communities;
pub mod memberships;
pub mod system;
