use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};
use crowdlink_backend::{
    AppState,
    config::Config,
    events::EventHub,
    middleware::{RateLimiter, auth_middleware, log_errors, rate_limit},
    routes,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'crowdlink_backend';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    // 设置 Redis 客户端
    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");
    let redis_arc = Arc::new(redis_client.clone());

    // 设置应用状态
    let state = AppState {
        pool,
        config: config.clone(),
        redis: redis_arc,
        events: EventHub::new(),
        http: reqwest::Client::new(),
    };

    // 设置限流器
    let rate_limiter = Arc::new(RateLimiter::new(redis_client, config.clone()));

    // 将路由分为公开路由和受保护路由
    let public_routes = Router::new()
        // 用户公开路由
        .route("/users/register", post(routes::user::register))
        .route("/users/temporary", post(routes::user::create_temporary))
        .route("/users/login", post(routes::user::login));

    let protected_routes = Router::new()
        // 需要认证的用户路由
        .route("/users/update-nickname", put(routes::user::update_nickname))
        .route("/users/heartbeat", post(routes::user::heartbeat))
        .route("/users/set-role", put(routes::user::set_role))
        .route("/users/refresh-token", post(routes::user::refresh_token))
        .route("/users/check-token", get(routes::user::check_token))
        // 会话启动时的群组归属解析
        .route(
            "/session/resolve-group",
            post(routes::group::resolve_session_group),
        )
        // 群组路由
        .route("/groups/create", post(routes::group::create_group))
        .route("/groups/by-id", get(routes::group::find_by_id))
        .route("/groups/join", post(routes::group::join_group))
        .route("/groups/leave", post(routes::group::leave_group))
        .route("/groups/delete", post(routes::group::delete_group))
        .route("/groups/members", get(routes::group::get_members))
        .route("/groups/kick", post(routes::group::kick_member))
        // 消息路由
        .route("/messages/create", post(routes::message::create_message))
        .route("/messages/get", post(routes::message::get_messages))
        .route("/messages/stream", get(routes::message::stream_messages))
        // 位置路由
        .route("/locations/update", post(routes::location::update_location))
        .route("/locations/group", get(routes::location::get_group_locations))
        .route("/locations/delete", post(routes::location::delete_location))
        // POI路由
        .route("/pois/create", post(routes::poi::create_poi))
        .route("/pois/nearby", get(routes::poi::find_nearby))
        .route("/pois/delete", post(routes::poi::delete_poi))
        // 紧急告警路由
        .route(
            "/emergencies/create",
            post(routes::emergency::create_emergency),
        )
        .route(
            "/emergencies/resolve",
            post(routes::emergency::resolve_emergency),
        )
        .route("/emergencies/active", get(routes::emergency::list_active))
        // 应用认证中间件
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // 创建基础路由
    let router = Router::new().merge(public_routes).merge(protected_routes);

    // 添加日志中间件和限流中间件
    let router = router.layer(axum::middleware::from_fn(log_errors)).layer(
        axum::middleware::from_fn_with_state(rate_limiter, rate_limit),
    );

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        // 设置开发环境的CORS，允许所有来源
        let cors = CorsLayer::permissive();
        router.layer(cors)
    };

    // 添加应用状态
    let app = router.with_state(state.clone());

    // 启动服务器
    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
