use axum::Router;
use tokio::net::TcpListener;

/**
 * \brief 在随机端口启动桩服务，返回基地址。
 */
pub async fn spawn_stub(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve stub");
    });
    format!("http://{}", addr)
}

/**
 * \brief 返回一个当前无人监听的地址。
 */
pub async fn unused_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe listener");
    let addr = listener.local_addr().expect("probe addr");
    drop(listener);
    format!("http://{}", addr)
}
