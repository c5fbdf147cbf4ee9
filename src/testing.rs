// 该文件是 Thermal Dataset 项目的一部分。
// src/testing.rs - 测试用的本地 HTTP 服务
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  io::{BufRead, BufReader, Read, Write},
  net::{TcpListener, TcpStream},
  sync::mpsc,
  thread,
  time::Duration,
};

/// 服务端收到的请求
pub struct CapturedRequest {
  /// 请求行与请求头
  pub head: String,
  pub body: Vec<u8>,
}

impl CapturedRequest {
  pub fn request_line(&self) -> &str {
    self.head.lines().next().unwrap_or_default()
  }
}

pub struct StubResponse {
  pub status: u16,
  pub body: Vec<u8>,
  pub delay: Duration,
}

impl StubResponse {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    StubResponse {
      status,
      body: body.into(),
      delay: Duration::ZERO,
    }
  }

  pub fn delayed(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }
}

/// 每个连接按顺序应答一个响应，返回 `http://127.0.0.1:<port>` 和收到的请求
pub fn serve(responses: Vec<StubResponse>) -> (String, mpsc::Receiver<CapturedRequest>) {
  let listener = TcpListener::bind("127.0.0.1:0").unwrap();
  let addr = listener.local_addr().unwrap();
  let (tx, rx) = mpsc::channel();

  thread::spawn(move || {
    for response in responses {
      let Ok((mut stream, _)) = listener.accept() else {
        return;
      };
      let request = read_request(&mut stream);
      let _ = tx.send(request);

      thread::sleep(response.delay);
      let head = format!(
        "HTTP/1.1 {} Stub\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        response.body.len()
      );
      let _ = stream.write_all(head.as_bytes());
      let _ = stream.write_all(&response.body);
      let _ = stream.flush();
    }
  });

  (format!("http://{}", addr), rx)
}

fn read_request(stream: &mut TcpStream) -> CapturedRequest {
  let mut reader = BufReader::new(stream);
  let mut head = String::new();
  loop {
    let mut line = String::new();
    match reader.read_line(&mut line) {
      Ok(0) | Err(_) => break,
      Ok(_) => {}
    }
    head.push_str(&line);
    if line == "\r\n" {
      break;
    }
  }

  let length = head
    .lines()
    .filter_map(|line| line.split_once(':'))
    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
    .and_then(|(_, value)| value.trim().parse().ok())
    .unwrap_or(0);
  let mut body = vec![0; length];
  let _ = reader.read_exact(&mut body);

  CapturedRequest { head, body }
}
