//! Fixed test identifiers
//!
//! All identifiers are deterministic so that expected issuers and JWKS paths
//! can be written as constants.

// User pool
pub const TEST_REGION: &str = "us-east-1";
pub const TEST_USER_POOL_ID: &str = "us-east-1_TestPool";
pub const TEST_ISSUER: &str = "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_TestPool";
pub const TEST_JWKS_PATH: &str = "/.well-known/jwks.json";

// App clients
pub const TEST_CLIENT_ID: &str = "test-web-client";
pub const TEST_MOBILE_CLIENT_ID: &str = "test-mobile-client";
pub const OTHER_CLIENT_ID: &str = "not-allow-listed-client";

// Users
pub const TEST_SUBJECT_ALICE: &str = "8f3b2c1d-0000-4000-8000-00000000a11c";
pub const TEST_SUBJECT_BOB: &str = "8f3b2c1d-0000-4000-8000-000000000b0b";

// Groups and scopes
pub const GROUP_ADMINS: &str = "admins";
pub const GROUP_EDITORS: &str = "editors";
pub const SCOPE_SIGNIN_ADMIN: &str = "aws.cognito.signin.user.admin";
